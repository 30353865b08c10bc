use bytes::BytesMut;
use spud::http::encoding::TextEncoding;
use spud::http::parser::{
    LineSplitter, ParseError, ParsedMessage, ParserLimits, RequestParser, parse_header,
};
use spud::http::request::Method;

fn parser() -> RequestParser {
    RequestParser::new(TextEncoding::Latin1, ParserLimits::default())
}

fn parse_all(raw: &[u8]) -> Result<Option<ParsedMessage>, ParseError> {
    parser().parse(&mut BytesMut::from(raw))
}

#[test]
fn test_parse_simple_get_request() {
    let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
    let parsed = parser().parse(&mut buf).unwrap().unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert!(parsed.body.is_none());
    assert!(buf.is_empty());
}

#[test]
fn test_parse_post_request_with_body() {
    let parsed = parse_all(b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap()
        .unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path, "/api");
    assert_eq!(parsed.body.as_deref(), Some("hello"));
}

#[test]
fn test_parse_multiple_headers() {
    let parsed = parse_all(b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n")
        .unwrap()
        .unwrap();

    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(parsed.headers.get("User-Agent").unwrap(), "test-client");
    assert_eq!(parsed.headers.get("Accept").unwrap(), "*/*");
}

#[test]
fn test_parse_duplicate_header_last_write_wins() {
    let parsed = parse_all(b"GET / HTTP/1.1\r\nX-Tag: one\r\nX-Tag: two\r\n\r\n")
        .unwrap()
        .unwrap();

    assert_eq!(parsed.headers.get("X-Tag").unwrap(), "two");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let parsed = parse_all(b"GET /search?q=rust&tag=a&tag=b+c HTTP/1.1\r\n\r\n")
        .unwrap()
        .unwrap();

    assert_eq!(parsed.path, "/search");
    assert_eq!(
        parsed.query,
        vec![
            ("q".to_string(), "rust".to_string()),
            ("tag".to_string(), "a".to_string()),
            ("tag".to_string(), "b c".to_string()),
        ]
    );
}

#[test]
fn test_parse_url_decodes_path() {
    let parsed = parse_all(b"GET /api/hello%20world HTTP/1.1\r\n\r\n").unwrap().unwrap();

    assert_eq!(parsed.path, "/api/hello world");
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let result = parse_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n");

    assert!(matches!(result, Ok(None)));
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let result = parse_all(b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello");

    assert!(matches!(result, Ok(None)));
}

#[test]
fn test_parse_body_only_completes_at_content_length() {
    let raw = b"POST /api/sum HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";
    let mut p = parser();
    let mut buf = BytesMut::new();

    // one byte at a time; nothing comes out until the last body byte
    for (i, byte) in raw.iter().enumerate() {
        buf.extend_from_slice(&[*byte]);
        let out = p.parse(&mut buf).unwrap();
        if i + 1 < raw.len() {
            assert!(out.is_none(), "message completed early at byte {i}");
        } else {
            assert_eq!(out.unwrap().body.as_deref(), Some("hello world"));
        }
    }
}

#[test]
fn test_parse_pipelined_requests_keep_leftover_bytes() {
    let mut p = parser();
    let mut buf = BytesMut::from(
        &b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET /b HTTP/1.1\r\n\r\nGET /c"[..],
    );

    let first = p.parse(&mut buf).unwrap().unwrap();
    assert_eq!(first.path, "/a");
    assert_eq!(first.body.as_deref(), Some("hi"));

    let second = p.parse(&mut buf).unwrap().unwrap();
    assert_eq!(second.path, "/b");
    assert!(second.body.is_none());

    // the unterminated third request line stays in the buffer untouched
    assert!(p.parse(&mut buf).unwrap().is_none());
    assert!(p.is_idle());
    assert_eq!(&buf[..], b"GET /c");
}

#[test]
fn test_parse_accepts_bare_newlines() {
    let parsed = parse_all(b"GET /x HTTP/1.1\nHost: h\n\n").unwrap().unwrap();

    assert_eq!(parsed.path, "/x");
    assert_eq!(parsed.headers.get("Host").unwrap(), "h");
}

#[test]
fn test_parse_invalid_http_method() {
    let result = parse_all(b"INVALID / HTTP/1.1\r\n\r\n");

    assert!(matches!(result, Err(ParseError::InvalidMethod(m)) if m == "INVALID"));
}

#[test]
fn test_parse_unsupported_methods_are_rejected() {
    for method in ["PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"] {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method);
        let result = parse_all(req.as_bytes());
        assert!(matches!(result, Err(ParseError::InvalidMethod(_))), "{method} accepted");
    }
}

#[test]
fn test_parse_malformed_header() {
    let result = parse_all(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n");

    assert!(matches!(result, Err(ParseError::InvalidHeader(line)) if line == "BrokenHeader"));
}

#[test]
fn test_parse_header_with_empty_name_is_kept() {
    let parsed = parse_all(b"GET / HTTP/1.1\r\n: orphan value\r\nHost: h\r\n\r\n")
        .unwrap()
        .unwrap();

    assert_eq!(parsed.headers.get("").unwrap(), "orphan value");
    assert_eq!(parsed.headers.get("Host").unwrap(), "h");
    assert_eq!(parse_header("Key:"), Ok(("Key".to_string(), String::new())));
}

#[test]
fn test_parse_request_with_empty_body() {
    let parsed = parse_all(b"POST /api HTTP/1.1\r\nContent-Length: 0\r\n\r\n").unwrap().unwrap();

    assert_eq!(parsed.body.as_deref(), Some(""));
}

#[test]
fn test_parse_malformed_content_length_is_treated_as_zero() {
    let mut buf = BytesMut::from(&b"POST /api HTTP/1.1\r\nContent-Length: lots\r\n\r\nxyz"[..]);
    let parsed = parser().parse(&mut buf).unwrap().unwrap();

    assert_eq!(parsed.body.as_deref(), Some(""));
    assert_eq!(parsed.malformed_length.as_deref(), Some("lots"));
    assert_eq!(&buf[..], b"xyz");
}

#[test]
fn test_parse_body_over_limit() {
    let limits = ParserLimits {
        max_line_length: 1024,
        max_body_bytes: 4,
    };
    let mut p = RequestParser::new(TextEncoding::Latin1, limits);
    let result = p.parse(&mut BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n"[..]));

    assert_eq!(result.unwrap_err(), ParseError::BodyTooLarge(5));
}

#[test]
fn test_parse_line_over_limit() {
    let limits = ParserLimits {
        max_line_length: 16,
        max_body_bytes: 1024,
    };
    let mut p = RequestParser::new(TextEncoding::Latin1, limits);
    let result = p.parse(&mut BytesMut::from(&b"GET /a-very-long-path-indeed"[..]));

    assert_eq!(result.unwrap_err(), ParseError::LineTooLong(16));
}

#[test]
fn test_parse_header_case_preservation() {
    let parsed = parse_all(b"GET / HTTP/1.1\r\ncontent-TYPE: application/json\r\n\r\n")
        .unwrap()
        .unwrap();

    // Headers are stored as-is with trimming
    assert!(parsed.headers.contains_key("content-TYPE"));
}

#[test]
fn test_parse_latin1_body() {
    let mut raw = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\ncaf".to_vec();
    raw.push(0xE9);

    let parsed = parse_all(&raw).unwrap().unwrap();

    assert_eq!(parsed.body.as_deref(), Some("caf\u{e9}"));
}

#[test]
fn test_line_splitter_handles_all_terminators() {
    let mut lines = LineSplitter::new(64);
    let mut buf = BytesMut::from(&b"a\r\nb\nc\rd\r"[..]);

    let mut out = Vec::new();
    while let Some(line) = lines.next_line(&mut buf).unwrap() {
        out.push(String::from_utf8(line.to_vec()).unwrap());
    }

    assert_eq!(out, vec!["a", "b", "c", "d"]);
    assert!(buf.is_empty());

    buf.extend_from_slice(b"\ne\n");
    assert_eq!(&lines.next_line(&mut buf).unwrap().unwrap()[..], b"e");
}
