/*
    dragonfox

    src/basic.rs

    Tokenized BASIC program decode/encode: a token table mapping ids to mnemonics, and the
    linked-list-of-lines wire format each line is packed in (§4.6).

    A tokenized program is a chain of lines, each `⟨link:u16 BE, line_number:u16 BE⟩` followed by
    a token/literal stream terminated by `0x00`; the chain itself terminates at a zero link. Bytes
    below `0x80` are literal ASCII (digits, operators, string contents); bytes from `0x80` up to
    (not including) `0xFF` are single-byte token ids; `0xFF` introduces a two-byte extended token
    id, taken from the byte that follows.
*/
const LINE_TERMINATOR: u8 = 0x00;
const EXTENDED_PREFIX: u8 = 0xFF;

/// `ELSE`'s token id. Called out by id because the decoder special-cases the colon that
/// immediately precedes it (§4.6).
const TOKEN_ELSE: u16 = 0x83;

/// Single-byte token ids (`0x80..=0xFE`) and their mnemonics. Not exhaustive of every historical
/// Color/Extended Color BASIC token — covers the statements and operators this crate's tests and
/// worked examples exercise.
const SINGLE_BYTE_TOKENS: &[(u16, &str)] = &[
    (0x80, "FOR"),
    (0x81, "GO"),
    (0x82, "REM"),
    (TOKEN_ELSE, "ELSE"),
    (0x84, "IF"),
    (0x85, "DATA"),
    (0x86, "PRINT"),
    (0x87, "ON"),
    (0x88, "INPUT"),
    (0x89, "END"),
    (0x8A, "NEXT"),
    (0x8B, "DIM"),
    (0x8C, "READ"),
    (0x8D, "RUN"),
    (0x8E, "RESTORE"),
    (0x8F, "RETURN"),
    (0x90, "STOP"),
    (0x91, "POKE"),
    (0x92, "CONT"),
    (0x93, "LIST"),
    (0x94, "CLEAR"),
    (0x95, "NEW"),
    (0x96, "DEF"),
    (0x97, "LET"),
    (0x98, "TO"),
    (0x99, "SUB"),
    (0x9A, "THEN"),
    (0x9B, "NOT"),
    (0x9C, "STEP"),
    (0x9D, "OFF"),
    (0x9E, "AND"),
    (0x9F, "OR"),
    (0xA0, ">"),
    (0xA1, "="),
    (0xA2, "<"),
    (0xA3, "+"),
    (0xA4, "-"),
    (0xA5, "*"),
    (0xA6, "/"),
    (0xA7, "^"),
    (0xA8, "GOTO"),
    (0xA9, "GOSUB"),
];

/// Two-byte extended token ids, `0xFF` followed by the second byte here. Represented internally
/// as `0xFF00 | second_byte` so a single table lookup handles both widths.
const EXTENDED_TOKENS: &[(u16, &str)] = &[
    (0xFF80, "PCLS"),
    (0xFF81, "PCOPY"),
    (0xFF82, "PMODE"),
    (0xFF83, "SCREEN"),
    (0xFF84, "CIRCLE"),
    (0xFF85, "DRAW"),
    (0xFF86, "PAINT"),
    (0xFF87, "RENUM"),
    (0xFF88, "AUDIO"),
];

fn lookup_single(id: u8) -> Option<&'static str> {
    SINGLE_BYTE_TOKENS.iter().find(|&&(tok, _)| tok == id as u16).map(|&(_, m)| m)
}

fn lookup_extended(second_byte: u8) -> Option<&'static str> {
    let id = 0xFF00 | second_byte as u16;
    EXTENDED_TOKENS.iter().find(|&&(tok, _)| tok == id).map(|&(_, m)| m)
}

fn id_of(mnemonic: &str) -> Option<u16> {
    SINGLE_BYTE_TOKENS
        .iter()
        .chain(EXTENDED_TOKENS.iter())
        .find(|&&(_, m)| m.eq_ignore_ascii_case(mnemonic))
        .map(|&(id, _)| id)
}

/// A single token of an unparsed token stream: either a literal run of bytes (digits, operators
/// outside the token table, string contents) or a keyword by mnemonic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    Literal(String),
    Keyword(String),
}

/// A decoded program line: its stored line number and its rendered text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicLine {
    pub line_number: u16,
    pub text: String,
}

/// Decode one line's token stream (the bytes between the line number and the `0x00` terminator)
/// into its displayed text. A colon (`0x3A`) immediately followed by the `ELSE` token is
/// suppressed — the decoded text reads `...ELSE...` with no colon before it (§4.6).
pub fn decode_line(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == 0x3A && i + 1 < bytes.len() && bytes[i + 1] as u16 == TOKEN_ELSE {
            out.push_str("ELSE");
            i += 2;
            continue;
        }
        if b == EXTENDED_PREFIX {
            if i + 1 >= bytes.len() {
                break;
            }
            match lookup_extended(bytes[i + 1]) {
                Some(mnemonic) => out.push_str(mnemonic),
                None => out.push_str(&format!("<FF{:02X}>", bytes[i + 1])),
            }
            i += 2;
            continue;
        }
        if b >= 0x80 {
            match lookup_single(b) {
                Some(mnemonic) => out.push_str(mnemonic),
                None => out.push_str(&format!("<{b:02X}>")),
            }
            i += 1;
            continue;
        }
        out.push(b as char);
        i += 1;
    }
    out
}

/// Decode an entire tokenized program: a chain of lines starting at `bytes[0]`, each
/// `⟨link:u16 BE, line_number:u16 BE⟩` then a token stream ending in `0x00`. The chain ends at the
/// first line whose link is zero.
pub fn decode_program(bytes: &[u8]) -> Vec<BasicLine> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    loop {
        if offset + 4 > bytes.len() {
            break;
        }
        let link = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        if link == 0 {
            break;
        }
        let line_number = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);
        let body_start = offset + 4;
        let terminator = bytes[body_start..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
            .map(|p| body_start + p)
            .unwrap_or(bytes.len());
        let text = decode_line(&bytes[body_start..terminator]);
        lines.push(BasicLine { line_number, text });
        offset = terminator + 1;
    }
    lines
}

/// Encode a single line's tokens into its on-wire byte stream, terminated by `0x00`. Used only to
/// build golden tokenized input for tests; it does not re-insert a colon before `ELSE` (the
/// decoder's suppression is one-directional, §4.6 / DESIGN.md Open Question (c)).
pub fn encode_line_tokens(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    for token in tokens {
        match token {
            Token::Literal(s) => out.extend_from_slice(s.as_bytes()),
            Token::Keyword(mnemonic) => match id_of(mnemonic) {
                Some(id) if id > 0xFF => {
                    out.push(EXTENDED_PREFIX);
                    out.push((id & 0xFF) as u8);
                }
                Some(id) => out.push(id as u8),
                None => out.extend_from_slice(mnemonic.as_bytes()),
            },
        }
    }
    out.push(LINE_TERMINATOR);
    out
}

/// Encode a whole program from `(line_number, tokens)` pairs, computing each line's link as the
/// absolute byte offset of the following line (or `0` for the final line).
pub fn encode_program(lines: &[(u16, Vec<Token>)]) -> Vec<u8> {
    let bodies: Vec<Vec<u8>> = lines.iter().map(|(_, tokens)| encode_line_tokens(tokens)).collect();
    let mut out = Vec::new();
    let mut offset = 0usize;
    let header_size = 4;
    let sizes: Vec<usize> = bodies.iter().map(|b| header_size + b.len()).collect();
    for (i, (line_number, _)) in lines.iter().enumerate() {
        offset += sizes[i];
        let link = if i + 1 < lines.len() { offset as u16 } else { 0 };
        out.extend_from_slice(&link.to_be_bytes());
        out.extend_from_slice(&line_number.to_be_bytes());
        out.extend_from_slice(&bodies[i]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_line() {
        let tokens = vec![
            Token::Keyword("PRINT".into()),
            Token::Literal("\"HI\"".into()),
        ];
        let body = encode_line_tokens(&tokens);
        assert_eq!(decode_line(&body[..body.len() - 1]), "PRINT\"HI\"");
    }

    #[test]
    fn colon_before_else_is_suppressed() {
        let bytes = [0x3A, TOKEN_ELSE as u8];
        assert_eq!(decode_line(&bytes), "ELSE");
    }

    #[test]
    fn colon_without_else_is_literal() {
        let bytes = [0x3A, b'X'];
        assert_eq!(decode_line(&bytes), ":X");
    }

    #[test]
    fn extended_token_decodes() {
        let bytes = [EXTENDED_PREFIX, 0x84]; // CIRCLE
        assert_eq!(decode_line(&bytes), "CIRCLE");
    }

    #[test]
    fn program_terminates_on_zero_link() {
        let lines = vec![
            (10u16, vec![Token::Keyword("PRINT".into()), Token::Literal("1".into())]),
            (20u16, vec![Token::Keyword("END".into())]),
        ];
        let bytes = encode_program(&lines);
        let decoded = decode_program(&bytes);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].line_number, 10);
        assert_eq!(decoded[0].text, "PRINT1");
        assert_eq!(decoded[1].line_number, 20);
        assert_eq!(decoded[1].text, "END");
    }

    #[test]
    fn empty_program_decodes_to_no_lines() {
        assert!(decode_program(&[0x00, 0x00]).is_empty());
    }
}
