//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677), as used by
//! `Authentication::SASL` / `SASLContinue` / `SASLFinal`.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::postgres::ProtocolError;

/// `SCRAM-SHA-256-PLUS` is not offered: this driver never negotiates channel binding.
pub const MECHANISM: &str = "SCRAM-SHA-256";

type HmacSha256 = Hmac<Sha256>;

/// Drives one SCRAM-SHA-256 exchange. Constructed once per authentication
/// attempt, consumed across its two round trips.
pub struct Client {
    password: String,
    client_nonce: String,
    client_first_bare: String,
    auth_message: Option<String>,
    salted_password: Option<[u8; 32]>,
}

impl Client {
    pub fn new(password: &str) -> Self {
        let password = stringprep::saslprep(password)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| password.to_owned());

        let mut nonce_bytes = [0u8; 18];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let client_nonce = STANDARD.encode(nonce_bytes);

        let client_first_bare = format!("n=,r={client_nonce}");

        Self { password, client_nonce, client_first_bare, auth_message: None, salted_password: None }
    }

    /// The `gs2-header || client-first-message-bare` sent as the SASL initial response.
    pub fn client_first_message(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Handle the server-first-message carried by `AuthenticationSASLContinue`,
    /// returning the client-final-message to send back.
    pub fn handle_server_first(&mut self, data: &[u8]) -> Result<String, ProtocolError> {
        let server_first = std::str::from_utf8(data).map_err(|_| ProtocolError::scram("server-first-message is not utf8"))?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for field in server_first.split(',') {
            match field.split_at_checked(2) {
                Some(("r=", v)) => nonce = Some(v),
                Some(("s=", v)) => salt = Some(v),
                Some(("i=", v)) => iterations = v.parse::<u32>().ok(),
                _ => {},
            }
        }
        let nonce = nonce.ok_or(ProtocolError::scram("server-first-message missing nonce"))?;
        let salt = salt.ok_or(ProtocolError::scram("server-first-message missing salt"))?;
        let iterations = iterations.ok_or(ProtocolError::scram("server-first-message missing iteration count"))?;

        if !nonce.starts_with(&self.client_nonce) {
            return Err(ProtocolError::scram("server nonce does not extend client nonce"));
        }
        let salt = STANDARD.decode(salt).map_err(|_| ProtocolError::scram("server salt is not valid base64"))?;

        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), &salt, iterations, &mut salted_password);
        self.salted_password = Some(salted_password);

        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = Sha256::digest(client_key);

        let channel_binding = STANDARD.encode("n,,");
        let client_final_without_proof = format!("c={channel_binding},r={nonce}");

        let auth_message =
            format!("{},{server_first},{client_final_without_proof}", self.client_first_bare);

        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key.iter().zip(client_signature.iter()).map(|(a, b)| a ^ b).collect();

        self.auth_message = Some(auth_message);

        Ok(format!("{client_final_without_proof},p={}", STANDARD.encode(client_proof)))
    }

    /// Verify the server-final-message carried by `AuthenticationSASLFinal`.
    pub fn verify_server_final(&self, data: &[u8]) -> Result<(), ProtocolError> {
        let server_final = std::str::from_utf8(data).map_err(|_| ProtocolError::scram("server-final-message is not utf8"))?;

        let Some(("v=", signature)) = server_final.split_at_checked(2) else {
            return Err(ProtocolError::scram("server rejected authentication (no verifier)"));
        };
        let signature =
            STANDARD.decode(signature).map_err(|_| ProtocolError::scram("server signature is not valid base64"))?;

        let salted_password = self.salted_password.expect("handle_server_first must run first");
        let auth_message = self.auth_message.as_deref().expect("handle_server_first must run first");

        let server_key = hmac(&salted_password, b"Server Key");
        let expected = hmac(&server_key, auth_message.as_bytes());

        if expected.as_slice() != signature {
            return Err(ProtocolError::scram("server signature mismatch"));
        }
        Ok(())
    }
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_first_message_carries_nonce() {
        let client = Client::new("secret");
        let msg = client.client_first_message();
        assert!(msg.starts_with("n,,n=,r="));
        assert!(msg.contains(&client.client_nonce));
    }

    #[test]
    fn rejects_nonce_that_does_not_extend_client_nonce() {
        let mut client = Client::new("secret");
        let server_first = "r=not-the-right-nonce,s=c2FsdA==,i=4096";
        let err = client.handle_server_first(server_first.as_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::Scram(msg) if msg == "server nonce does not extend client nonce"));
    }
}
