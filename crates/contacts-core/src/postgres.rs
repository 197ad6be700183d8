//! PostgreSQL storage backend
//!
//! Implements [`CredentialStore`] and [`ContactStore`] with SQLx. The schema
//! lives in `migrations/` and is applied by [`PgStore::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::store::{ContactStore, CredentialStore};
use crate::{
    normalize_email, Contact, ContactDraft, ContactFilter, ContactsError, Result, User, UserRole,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, is_verified, role, avatar_url, \
                            is_active, created_at, updated_at";

const CONTACT_COLUMNS: &str = "id, owner_id, first_name, last_name, email, phone, birthday, \
                               additional_info, created_at, updated_at";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ContactsError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ContactsError::DatabaseError(format!("Migration failed: {e}")))
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    is_verified: bool,
    role: String,
    avatar_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ContactsError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            is_verified: row.is_verified,
            role: row.role.parse()?,
            avatar_url: row.avatar_url,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Contact row from database
#[derive(Debug, FromRow)]
struct ContactRow {
    id: Uuid,
    owner_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    birthday: NaiveDate,
    additional_info: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            owner_id: row.owner_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            birthday: row.birthday,
            additional_info: row.additional_info,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Map driver errors, turning unique violations into `Conflict`
fn db_error(context: &str, err: sqlx::Error) -> ContactsError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return ContactsError::Conflict(format!("{context}: duplicate value"));
        }
    }
    ContactsError::DatabaseError(format!("{context}: {err}"))
}

/// Make `%`, `_` and `\` match literally inside an `ILIKE ... ESCAPE '\'` pattern
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn user_not_found(id: Uuid) -> ContactsError {
    ContactsError::NotFound(format!("user {id}"))
}

impl PgStore {
    async fn fetch_user(&self, sql: &str, bind: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch user", e))?
            .map(User::try_from)
            .transpose()
    }

    async fn update_user_returning(&self, sql: &str, id: Uuid) -> Result<User> {
        let query = format!("{sql} RETURNING {USER_COLUMNS}");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update user", e))?
            .ok_or_else(|| user_not_found(id))?;
        User::try_from(row)
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = $1");
        self.fetch_user(&sql, &normalize_email(email)).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch user", e))?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        self.fetch_user(&sql, username).await
    }

    async fn create(&self, user: User) -> Result<User> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(normalize_email(&user.email))
            .bind(&user.password_hash)
            .bind(user.is_verified)
            .bind(user.role.as_str())
            .bind(&user.avatar_url)
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to create user", e))?;
        User::try_from(row)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Failed to update password", e))?;

        if result.rows_affected() == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }

    async fn set_verified(&self, id: Uuid) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Failed to verify user", e))?;

        if result.rows_affected() == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }

    async fn update_avatar(&self, id: Uuid, avatar_url: &str) -> Result<User> {
        let sql = format!(
            "UPDATE users SET avatar_url = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(avatar_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update avatar", e))?
            .ok_or_else(|| user_not_found(id))?;
        User::try_from(row)
    }

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User> {
        let sql = match role {
            UserRole::Admin => "UPDATE users SET role = 'admin', updated_at = NOW() WHERE id = $1",
            UserRole::User => "UPDATE users SET role = 'user', updated_at = NOW() WHERE id = $1",
        };
        self.update_user_returning(sql, id).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<User> {
        let sql = if active {
            "UPDATE users SET is_active = TRUE, updated_at = NOW() WHERE id = $1"
        } else {
            "UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1"
        };
        self.update_user_returning(sql, id).await
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| db_error("Health check failed", e))
    }
}

#[async_trait]
impl ContactStore for PgStore {
    async fn list(&self, owner_id: Uuid, filter: &ContactFilter) -> Result<Vec<Contact>> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts \
             WHERE owner_id = $1 \
               AND ($2::TEXT IS NULL OR first_name ILIKE '%' || $2 || '%' ESCAPE '\\' \
                    OR last_name ILIKE '%' || $2 || '%' ESCAPE '\\') \
               AND ($3::TEXT IS NULL OR email ILIKE '%' || $3 || '%' ESCAPE '\\') \
             ORDER BY created_at, id \
             OFFSET $4 LIMIT $5"
        );
        let rows = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(owner_id)
            .bind(filter.name.as_deref().filter(|s| !s.is_empty()).map(escape_like))
            .bind(filter.email.as_deref().filter(|s| !s.is_empty()).map(escape_like))
            .bind(filter.offset())
            .bind(filter.page_size())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list contacts", e))?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Contact>> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND owner_id = $2");
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch contact", e))?;

        Ok(row.map(Contact::from))
    }

    async fn create(&self, owner_id: Uuid, draft: ContactDraft) -> Result<Contact> {
        let contact = Contact::from_draft(owner_id, draft);
        let sql = format!(
            "INSERT INTO contacts ({CONTACT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {CONTACT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(contact.id)
            .bind(contact.owner_id)
            .bind(&contact.first_name)
            .bind(&contact.last_name)
            .bind(&contact.email)
            .bind(&contact.phone)
            .bind(contact.birthday)
            .bind(&contact.additional_info)
            .bind(contact.created_at)
            .bind(contact.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to create contact", e))?;

        Ok(row.into())
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        draft: ContactDraft,
    ) -> Result<Option<Contact>> {
        let sql = format!(
            "UPDATE contacts SET first_name = $3, last_name = $4, email = $5, phone = $6, \
             birthday = $7, additional_info = $8, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 RETURNING {CONTACT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(&draft.first_name)
            .bind(&draft.last_name)
            .bind(normalize_email(&draft.email))
            .bind(&draft.phone)
            .bind(draft.birthday)
            .bind(&draft.additional_info)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update contact", e))?;

        Ok(row.map(Contact::from))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Contact>> {
        let sql = format!(
            "DELETE FROM contacts WHERE id = $1 AND owner_id = $2 RETURNING {CONTACT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete contact", e))?;

        Ok(row.map(Contact::from))
    }

    async fn upcoming_birthdays(
        &self,
        owner_id: Uuid,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<Contact>> {
        // Anniversary arithmetic (year wrap, Feb 29) stays in one place: Contact::next_birthday
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE owner_id = $1");
        let rows = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch birthdays", e))?;

        let mut upcoming: Vec<Contact> = rows
            .into_iter()
            .map(Contact::from)
            .filter(|c| c.birthday_within(today, days))
            .collect();
        upcoming.sort_by_key(|c| c.next_birthday(today));
        Ok(upcoming)
    }
}
