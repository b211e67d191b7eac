use crate::protocol::LoginCredential;

/// Decides whether a login handshake succeeds.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &LoginCredential) -> bool;
}

/// Approves every credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn authenticate(&self, _credential: &LoginCredential) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_all_never_rejects() {
        for (id, pw) in [("alice", "pw"), ("", ""), ("bob", "wrong")] {
            assert!(AcceptAll.authenticate(&LoginCredential::new(id, pw)));
        }
    }
}
