use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::model::admin::Admin;
use crate::models::Claims;

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

pub fn generate_token(admin: &Admin, secret: &str, ttl: usize) -> Result<String, Error> {
    let issued_at = now();
    let claims = Claims {
        sub: admin.username.clone(),
        id: admin.id,
        role: admin.role,
        iat: issued_at,
        exp: issued_at + ttl,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::admin::{AdminRole, Permissions};

    fn admin() -> Admin {
        Admin {
            id: 7,
            username: "registrar".into(),
            email: "registrar@college.edu".into(),
            full_name: "Registrar".into(),
            role: AdminRole::SuperAdmin,
            permissions: Permissions::default(),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trips_claims() {
        let token = generate_token(&admin(), "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();

        assert_eq!(claims.id, 7);
        assert_eq!(claims.sub, "registrar");
        assert_eq!(claims.role, AdminRole::SuperAdmin);
        assert_eq!(claims.exp, claims.iat + 60);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(&admin(), "s3cret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued_at = now() - 3600;
        let claims = Claims {
            sub: "registrar".into(),
            id: 7,
            role: AdminRole::Admin,
            iat: issued_at,
            exp: issued_at + 60,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();

        assert!(verify_token(&token, "s3cret").is_err());
    }
}
