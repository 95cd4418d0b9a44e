//! Token fixtures shared by unit and integration tests.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use serde_json::json;

pub const TEST_KID: &str = "test-signing-key-1";

/// Key set served by the mock identity provider.
pub const JWKS_BODY: &str = include_str!("../testdata/jwks.json");

static SIGNING_KEY: Lazy<EncodingKey> = Lazy::new(|| {
    EncodingKey::from_rsa_pem(include_bytes!("../testdata/private_test_rsa_key.pem"))
        .expect("test signing key should parse")
});

/// A key the provider never published, for forged signatures.
static ROGUE_KEY: Lazy<EncodingKey> = Lazy::new(|| {
    EncodingKey::from_rsa_pem(include_bytes!("../testdata/rogue_test_rsa_key.pem"))
        .expect("rogue signing key should parse")
});

pub struct TokenOptions<'a> {
    pub subject: &'a str,
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub role_metadata: Option<&'a str>,
    pub issuer: Option<&'a str>,
    pub kid: &'a str,
    /// Seconds from now; negative values produce an expired token
    pub expires_in: i64,
    pub rogue_key: bool,
}

impl Default for TokenOptions<'_> {
    fn default() -> Self {
        Self {
            subject: "user_test",
            email: None,
            name: None,
            role_metadata: None,
            issuer: None,
            kid: TEST_KID,
            expires_in: 3600,
            rogue_key: false,
        }
    }
}

pub fn mint_token_with(options: TokenOptions<'_>) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "sub": options.subject,
        "iat": now,
        "exp": now + options.expires_in,
    });
    if let Some(email) = options.email {
        claims["email"] = json!(email);
    }
    if let Some(name) = options.name {
        claims["name"] = json!(name);
    }
    if let Some(role) = options.role_metadata {
        claims["metadata"] = json!({ "role": role });
    }
    if let Some(issuer) = options.issuer {
        claims["iss"] = json!(issuer);
    }

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(options.kid.to_string());

    let key = if options.rogue_key {
        &*ROGUE_KEY
    } else {
        &*SIGNING_KEY
    };
    encode(&header, &claims, key).expect("token should encode")
}

pub fn mint_token(subject: &str, email: Option<&str>) -> String {
    mint_token_with(TokenOptions {
        subject,
        email,
        ..TokenOptions::default()
    })
}
