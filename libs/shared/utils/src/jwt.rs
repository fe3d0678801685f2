use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use shared_models::auth::{AuthUser, JwtClaims, Role};

type HmacSha256 = Hmac<Sha256>;

/// Issue an HS256 token for an authenticated account.
pub fn issue_token(
    user_id: i64,
    username: &str,
    email: Option<&str>,
    role: Role,
    jwt_secret: &str,
    ttl_hours: i64,
) -> Result<String, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let now = Utc::now().timestamp();
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    let claims = json!({
        "sub": user_id.to_string(),
        "username": username,
        "email": email,
        "role": role,
        "iat": now,
        "exp": now + ttl_hours * 3600,
    });

    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
    let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<AuthUser, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let mut mac = match HmacSha256::new_from_slice(jwt_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };
    mac.update(signing_input.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = match URL_SAFE_NO_PAD.decode(claims_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(_) => return Err("Invalid claims encoding".to_string()),
    };

    let claims: JwtClaims = match serde_json::from_str(&claims_json) {
        Ok(c) => c,
        Err(e) => {
            debug!("Failed to parse claims: {}", e);
            return Err("Invalid claims format".to_string());
        }
    };

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| "Invalid subject claim".to_string())?;

    let user = AuthUser {
        id,
        username: claims.username.unwrap_or_default(),
        email: claims.email,
        role: claims.role.ok_or_else(|| "Missing role claim".to_string())?,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_signed_token() {
        let token = issue_token(
            42,
            "dr.house",
            Some("house@clinic.example"),
            Role::Doctor,
            "test-secret-key-long-enough-for-hs256",
            24,
        )
        .unwrap();

        let user = validate_token(&token, "test-secret-key-long-enough-for-hs256").unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.username, "dr.house");
        assert_eq!(user.role, Role::Doctor);
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let token = issue_token(1, "alice", None, Role::Patient, "secret-a", 24).unwrap();
        assert!(validate_token(&token, "secret-b").is_err());
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert!(validate_token("not-a-token", "secret").is_err());
        assert!(validate_token("a.b", "secret").is_err());
    }
}
