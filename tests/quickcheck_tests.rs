//! A handful of `quickcheck` determinism checks, alongside the
//! `proptest`-based checks in `property_tests.rs` — the teacher's own
//! test suite pairs both crates the same way (`tests/pmat_property_tests.rs`).

use cachesquid::http;
use quickcheck_macros::quickcheck;

#[quickcheck]
fn qc_parse_cache_control_stable(value: String) -> bool {
    http::parse_cache_control(&value) == http::parse_cache_control(&value)
}

#[quickcheck]
fn qc_get_status_code_stable(response: String) -> bool {
    http::get_status_code(response.as_bytes()) == http::get_status_code(response.as_bytes())
}

#[quickcheck]
fn qc_get_request_line_stable(bytes: Vec<u8>) -> bool {
    http::get_request_line(&bytes) == http::get_request_line(&bytes)
}

#[quickcheck]
fn qc_make_error_response_status_matches_code(code: u16, text: String) -> bool {
    let code = 100 + (code % 500);
    let response = http::make_error_response(code, &text);
    http::get_status_code(response.as_bytes()) == code as i32
}
