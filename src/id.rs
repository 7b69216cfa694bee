//! Per-connection request identifiers: 128-bit values rendered as
//! 36-character hyphenated hexadecimal, used solely as a correlation tag
//! in the request log.

use uuid::Uuid;

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn test_generate_request_id_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }
}
