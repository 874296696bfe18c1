/// Relay auth
///
/// ed25519 JWT used as the bearer token when talking to the relay RPC, plus
/// the `did:key` identity derived from the same seed.
///
use alloy::hex;
use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{SigningKey, ed25519::signature::SignerMut};
use serde::Serialize;

use crate::utils::{random_bytes32, unix_timestamp};

const JWT_TTL: u64 = 86400;

// base58btc of the multicodec ed25519-pub header bytes [0xed, 0x01]
const MULTICODEC_ED25519_HEADER: &str = "K36";
const MULTICODEC_BASE: &str = "z";

/// Keypair derived from the client seed. Only used for JWT signing, never
/// for payload encryption.
#[derive(Debug, Clone)]
pub struct Keypair {
    seed: [u8; 32],
    public_key: [u8; 32],
}

impl Keypair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key().to_bytes();
        Self { seed, public_key }
    }

    pub fn generate() -> Self {
        Keypair::from_seed(random_bytes32())
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let mut signing_key = SigningKey::from(self.seed);
        signing_key.sign(data).to_bytes()
    }

    /// `did:key` representation of the public key, used as the client id
    /// towards the relay.
    pub fn client_id(&self) -> String {
        let header = bs58::decode(MULTICODEC_ED25519_HEADER)
            .into_vec()
            .expect("header is valid base58");
        let encoded =
            bs58::encode([header, self.public_key.to_vec()].concat())
                .into_string();
        format!("did:key:{MULTICODEC_BASE}{encoded}")
    }

    /// Sign a JWT authorizing us towards the relay at `aud`. The subject is
    /// a random session identifier as per the relay auth spec.
    pub fn sign_jwt(&self, aud: &str) -> crate::Result<String> {
        let iat = unix_timestamp()?;
        let header = JwtHeader {
            alg: "EdDSA",
            typ: "JWT",
        };
        let payload = JwtPayload {
            iss: self.client_id(),
            sub: hex::encode(random_bytes32()),
            aud: aud.to_string(),
            iat,
            exp: iat + JWT_TTL,
        };

        let message =
            format!("{}.{}", encode_json(&header)?, encode_json(&payload)?);
        let signature =
            Base64UrlUnpadded::encode_string(&self.sign(message.as_bytes()));
        Ok(format!("{message}.{signature}"))
    }
}

#[derive(Serialize)]
struct JwtHeader {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct JwtPayload {
    iss: String,
    sub: String,
    aud: String,
    iat: u64,
    exp: u64,
}

fn encode_json<T: Serialize>(val: &T) -> crate::Result<String> {
    Ok(Base64UrlUnpadded::encode_string(
        serde_json::to_string(val)?.as_bytes(),
    ))
}

#[cfg(test)]
mod tests {
    use super::Keypair;

    #[test]
    fn client_id_zero_seed() {
        let keypair = Keypair::from_seed([0; 32]);
        assert_eq!(
            keypair.client_id(),
            "did:key:z6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp"
        );
    }

    #[test]
    fn client_id_known_seed() {
        let keypair = Keypair::from_seed([
            23, 113, 199, 94, 246, 41, 119, 10, 250, 248, 253, 136, 173, 241,
            191, 149, 165, 249, 17, 42, 46, 189, 120, 175, 78, 88, 53, 83,
            254, 16, 32, 150,
        ]);
        assert_eq!(
            keypair.client_id(),
            "did:key:z6MkriJMhx6cLMiwwfuJ3NCGw8C8UjB9KoVHB7QSBaBxMx3y"
        );
    }

    #[test]
    fn jwt_has_three_segments() {
        let keypair = Keypair::generate();
        let jwt = keypair.sign_jwt("https://relay.walletconnect.org").unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }
}
