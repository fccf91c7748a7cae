//! Password responses.

use md5::{Digest, Md5};

use crate::protocol::codec::MessageBuilder;

/// Write a PasswordMessage carrying a cleartext or pre-hashed password.
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::tagged(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// Derive the response to an MD5 password challenge.
///
/// The scheme is `"md5" + md5(md5(password + username) + salt)`, each
/// digest rendered as lowercase hex before feeding the next stage.
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    let credentials = md5_hex([password.as_bytes(), username.as_bytes()]);
    let salted = md5_hex([credentials.as_bytes(), &salt[..]]);
    format!("md5{salted}")
}

fn md5_hex(parts: [&[u8]; 2]) -> String {
    let mut digest = Md5::new();
    for part in parts {
        digest.update(part);
    }
    format!("{:x}", digest.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_password() {
        let hashed = md5_password("alice", "secret", &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(hashed, "md51b28a7c92eb5e95d85e9b9093da502a9");
    }

    #[test]
    fn test_password_message() {
        let mut buf = Vec::new();
        write_password(&mut buf, "hunter2");

        assert_eq!(buf[0], b'p');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
        assert_eq!(&buf[5..], b"hunter2\0");
    }
}
