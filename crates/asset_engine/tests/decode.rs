use std::collections::BTreeMap;

use asset_engine::{decode_html, decode_page, FetchResponse};
use bytes::Bytes;
use pretty_assertions::assert_eq;

#[test]
fn decode_respects_charset_header() {
    let bytes = b"<h2>Mat\xe9riel</h2>"; // iso-8859-1
    let decoded = decode_html(bytes, Some("text/html; charset=ISO-8859-1")).unwrap();
    assert_eq!(decoded.html, "<h2>Matériel</h2>");
    assert!(decoded.encoding_label.eq_ignore_ascii_case("windows-1252"));
}

#[test]
fn decode_handles_utf8_bom() {
    let bytes = b"\xEF\xBB\xBF<h2>Spielmaterial</h2>";
    let decoded = decode_html(bytes, Some("text/html")).unwrap();
    assert_eq!(decoded.html, "<h2>Spielmaterial</h2>");
    assert_eq!(decoded.encoding_label, "UTF-8");
}

#[test]
fn meta_charset_is_used_without_header() {
    let bytes = b"<html><head><meta charset=\"windows-1252\"></head><body>Bo\xeete</body></html>";
    let decoded = decode_html(bytes, None).unwrap();
    assert!(decoded.html.contains("Boîte"));
    assert_eq!(decoded.encoding_label, "windows-1252");
}

#[test]
fn decode_page_reads_the_response_content_type() {
    let response = FetchResponse {
        status: 200,
        headers: BTreeMap::from([(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )]),
        body: Bytes::from_static("<h2>Componentes</h2>".as_bytes()),
        from_cache: false,
    };
    assert_eq!(decode_page(&response).unwrap().html, "<h2>Componentes</h2>");
}
