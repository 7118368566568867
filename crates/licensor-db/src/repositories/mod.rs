//! Repository implementations for PostgreSQL.

mod keys;
mod license;
mod license_type;
mod usage;

pub use keys::PgKeyRegistry;
pub use license::PgLicenseRepository;
pub use license_type::PgLicenseTypeRepository;
pub use usage::PgUsageLogRepository;

use licensor_core::Error;

/// Map a driver failure onto the infrastructure error.
pub fn storage_error(e: sqlx::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// INTEGER columns hold counts the engine caps well below `i32::MAX`.
pub(crate) fn to_i32(field: &str, value: u32) -> Result<i32, Error> {
    i32::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("{} is out of range: {}", field, value)))
}

/// `%text%` with LIKE metacharacters escaped.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
