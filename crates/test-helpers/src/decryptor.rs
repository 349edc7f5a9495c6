use poolkeeper_core::{DecryptError, PayloadDecryptor};
use poolkeeper_types::Account;

const PREFIX: &str = "stub:";

/// Encode an account the way [`StubDecryptor`] expects.
pub fn stub_payload(account: &Account) -> String {
    // Serializing a plain struct of strings cannot fail.
    format!(
        "{}{}",
        PREFIX,
        serde_json::to_string(account).unwrap_or_default()
    )
}

/// Decrypts `stub:`-prefixed JSON payloads; anything else is an encoding error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubDecryptor;

impl PayloadDecryptor for StubDecryptor {
    fn decrypt(&self, payload: &str) -> Result<Account, DecryptError> {
        let json = payload
            .strip_prefix(PREFIX)
            .ok_or_else(|| DecryptError::Encoding(format!("not a stub payload: {}", payload)))?;
        serde_json::from_str(json).map_err(|e| DecryptError::Payload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_payload_decrypts() {
        let account = Account::new("a@example.com", "r").with_project_id("p");
        assert_eq!(StubDecryptor.decrypt(&stub_payload(&account)).unwrap(), account);
        assert!(matches!(
            StubDecryptor.decrypt("garbage"),
            Err(DecryptError::Encoding(_))
        ));
    }
}
