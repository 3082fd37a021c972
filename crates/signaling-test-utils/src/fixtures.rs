//! Test users and credentials.

use common::jwt::{sign_user_token, UserClaims};
use signaling_service::directory::{InMemoryUserDirectory, UserRecord};
use signaling_service::identity::Identity;
use std::time::Duration;

/// HS256 secret used by every signed fixture credential.
pub const TEST_SECRET: &str = "test-secret-for-signaling-fixtures";

pub fn ann() -> Identity {
    Identity::new("u-ann", "Ann")
}

pub fn bo() -> Identity {
    Identity::new("u-bo", "Bo")
}

pub fn cy() -> Identity {
    Identity::new("u-cy", "Cy")
}

/// Directory with Ann, Bo and Cy. Ann's contacts are Bo and Cy.
pub fn seeded_directory() -> InMemoryUserDirectory {
    InMemoryUserDirectory::from_records([
        UserRecord::new("u-ann", "Ann").with_contacts(["u-bo", "u-cy"]),
        UserRecord::new("u-bo", "Bo").with_contacts(["u-ann"]),
        UserRecord::new("u-cy", "Cy").with_contacts(["u-ann"]),
    ])
}

/// A valid credential for `user_id`, good for an hour.
pub fn token_for(user_id: &str) -> String {
    let claims = UserClaims::issued_now(user_id, Duration::from_secs(3600));
    sign_user_token(&claims, TEST_SECRET.as_bytes()).expect("fixture token should sign")
}

/// A credential for `user_id` that expired an hour ago.
pub fn expired_token_for(user_id: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = UserClaims {
        id: user_id.to_string(),
        exp: now - 3600,
        iat: now - 7200,
    };
    sign_user_token(&claims, TEST_SECRET.as_bytes()).expect("fixture token should sign")
}
