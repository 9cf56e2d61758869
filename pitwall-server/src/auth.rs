/// Verifies the token presented as a query parameter at connect time.
///
/// The token travels out-of-band on the connect URL, never inside channel
/// payloads.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: Option<&str>) -> bool;
}

/// Accepts every connection, with or without a token
#[derive(Debug, Default)]
pub struct AllowAll;

impl TokenVerifier for AllowAll {
    fn verify(&self, _token: Option<&str>) -> bool {
        true
    }
}

/// Accepts only connections presenting one shared token
#[derive(Debug)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

impl TokenVerifier for StaticToken {
    fn verify(&self, token: Option<&str>) -> bool {
        token == Some(self.0.as_str())
    }
}
