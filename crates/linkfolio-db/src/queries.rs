use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::{info, warn};

use linkfolio_types::models::{Account, LinkEntry, ProfileSummary};

use crate::Database;
use crate::models::{
    AccountRow, CheckOutcome, LinkColumn, NewAccount, ProfileRow, ProfileUpdate, Step,
    UpdateOutcome, decode_links, encode_links, unique_url,
};

const ACCOUNT_SELECT: &str = "SELECT id, username, email, niche, name, aboutme, uniqueUrl, image,
        COALESCE(reward_links, '[]'), COALESCE(secondary_links, '[]'), ecommerce
     FROM accounts";

impl Database {
    // -- Lookups --

    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let email = email.to_string();
        let row = self
            .with_conn(move |conn| query_account_by_email(conn, &email))
            .await?;
        row.map(AccountRow::into_account).transpose()
    }

    pub async fn find_account_id_by_email(&self, email: &str) -> Result<Option<i64>> {
        let email = email.to_string();
        self.with_conn(move |conn| query_account_id(conn, &email))
            .await
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM accounts WHERE username = ?1 LIMIT 1",
                    [&username],
                    |_| Ok(()),
                )
                .optional()
                .context("Failed to look up username")?;
            Ok(found.is_some())
        })
        .await
    }

    // -- Creation --

    pub async fn insert_account(&self, account: &NewAccount) -> Result<i64> {
        let account = account.clone();
        self.with_conn(move |conn| insert_account(conn, &account))
            .await
    }

    /// Look the email up and create an account for it when none exists.
    pub async fn check_or_create_account(&self, email: &str) -> Result<CheckOutcome> {
        let account = NewAccount::from_email(email);

        let outcome = if self.is_transactional() {
            self.with_transaction(move |tx| check_or_create(tx, &account))
                .await?
        } else {
            // Two statements on whichever connections the pool hands out;
            // a concurrent request for the same email can slip in between.
            match self.find_account_id_by_email(email).await? {
                Some(id) => CheckOutcome::Existing(id),
                None => CheckOutcome::Created(self.insert_account(&account).await?),
            }
        };

        if let CheckOutcome::Created(id) = outcome {
            info!("Account {} created for {}", id, email);
        }
        Ok(outcome)
    }

    // -- Profile --

    /// The stored image filename. `None` means no account has this email.
    pub async fn current_image(&self, email: &str) -> Result<Option<Option<String>>> {
        let email = email.to_string();
        self.with_conn(move |conn| query_current_image(conn, &email))
            .await
    }

    /// Overwrite the profile fields of the account with this email, keeping
    /// its stored image unless `update.image` carries a new one.
    pub async fn update_profile(&self, email: &str, update: &ProfileUpdate) -> Result<UpdateOutcome> {
        let email = email.to_string();
        let update = update.clone();

        if self.is_transactional() {
            return self
                .with_transaction(move |tx| {
                    let Some(current) = query_current_image(tx, &email)? else {
                        return Ok(UpdateOutcome::NotFound);
                    };
                    let image = update.image.clone().or(current);
                    write_profile(tx, &email, &update, image.as_deref())?;
                    Ok(UpdateOutcome::Updated { image })
                })
                .await;
        }

        let Some(current) = self.current_image(&email).await? else {
            return Ok(UpdateOutcome::NotFound);
        };
        let image = update.image.clone().or(current);

        let stored = image.clone();
        self.with_conn(move |conn| write_profile(conn, &email, &update, stored.as_deref()))
            .await?;

        Ok(UpdateOutcome::Updated { image })
    }

    // -- Links --

    /// Replace one of the link columns. Returns the number of rows touched,
    /// which is zero when the email is unknown.
    pub async fn set_links(&self, email: &str, column: LinkColumn, links: &[LinkEntry]) -> Result<usize> {
        let encoded = encode_links(links)?;
        let email = email.to_string();
        let sql = format!("UPDATE accounts SET {} = ?1 WHERE email = ?2", column.column());

        let updated = self
            .with_conn(move |conn| {
                conn.execute(&sql, params![encoded, email])
                    .with_context(|| format!("Failed to update {}", column.column()))
            })
            .await?;

        if updated == 0 {
            warn!("{} update matched no account", column.column());
        }
        Ok(updated)
    }

    pub async fn set_reward_links(&self, email: &str, links: &[LinkEntry]) -> Result<usize> {
        self.set_links(email, LinkColumn::Reward, links).await
    }

    pub async fn set_secondary_links(&self, email: &str, links: &[LinkEntry]) -> Result<usize> {
        self.set_links(email, LinkColumn::Secondary, links).await
    }

    /// Decoded link list, `[]` when the column was never set. `None` means no
    /// account has this email.
    pub async fn links(&self, email: &str, column: LinkColumn) -> Result<Option<Vec<LinkEntry>>> {
        let email = email.to_string();
        let sql = format!(
            "SELECT COALESCE({}, '[]') FROM accounts WHERE email = ?1 ORDER BY id LIMIT 1",
            column.column()
        );

        let raw: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(&sql, [&email], |row| row.get(0))
                    .optional()
                    .with_context(|| format!("Failed to fetch {}", column.column()))
            })
            .await?;

        raw.map(|raw| decode_links(&raw)).transpose()
    }

    pub async fn reward_links(&self, email: &str) -> Result<Option<Vec<LinkEntry>>> {
        self.links(email, LinkColumn::Reward).await
    }

    pub async fn secondary_links(&self, email: &str) -> Result<Option<Vec<LinkEntry>>> {
        self.links(email, LinkColumn::Secondary).await
    }

    // -- Listing --

    /// Every account as a public profile. One unparseable link column fails
    /// the whole listing.
    pub async fn list_profiles(&self) -> Result<Vec<ProfileSummary>> {
        let rows = self.with_conn(|conn| query_profiles(conn)).await?;
        rows.into_iter().map(ProfileRow::into_summary).collect()
    }
}

fn check_or_create(conn: &Connection, account: &NewAccount) -> Result<CheckOutcome> {
    if let Some(id) = query_account_id(conn, &account.email)? {
        return Ok(CheckOutcome::Existing(id));
    }
    Ok(CheckOutcome::Created(insert_account(conn, account)?))
}

fn insert_account(conn: &Connection, account: &NewAccount) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (username, email, niche, uniqueUrl) VALUES (?1, ?2, ?3, ?4)",
        params![account.username, account.email, account.niche, account.unique_url],
    )
    .context(Step::Insert)?;
    Ok(conn.last_insert_rowid())
}

fn write_profile(
    conn: &Connection,
    email: &str,
    update: &ProfileUpdate,
    image: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE accounts
         SET username = ?1, niche = ?2, uniqueUrl = ?3, name = ?4, aboutme = ?5, image = ?6
         WHERE email = ?7",
        params![
            update.username,
            update.niche,
            unique_url(&update.username),
            update.name,
            update.aboutme,
            image,
            email,
        ],
    )
    .context(Step::WriteProfile)?;
    Ok(())
}

fn query_account_id(conn: &Connection, email: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM accounts WHERE email = ?1 ORDER BY id LIMIT 1",
        [email],
        |row| row.get(0),
    )
    .optional()
    .context(Step::Lookup)
}

fn query_current_image(conn: &Connection, email: &str) -> Result<Option<Option<String>>> {
    conn.query_row(
        "SELECT image FROM accounts WHERE email = ?1 ORDER BY id LIMIT 1",
        [email],
        |row| row.get(0),
    )
    .optional()
    .context(Step::FetchImage)
}

fn query_account_by_email(conn: &Connection, email: &str) -> Result<Option<AccountRow>> {
    let mut stmt = conn.prepare(&format!("{} WHERE email = ?1 ORDER BY id LIMIT 1", ACCOUNT_SELECT))?;

    let row = stmt
        .query_row([email], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                niche: row.get(3)?,
                name: row.get(4)?,
                aboutme: row.get(5)?,
                unique_url: row.get(6)?,
                image: row.get(7)?,
                reward_links: row.get(8)?,
                secondary_links: row.get(9)?,
                ecommerce: row.get(10)?,
            })
        })
        .optional()
        .context("Failed to fetch account")?;

    Ok(row)
}

fn query_profiles(conn: &Connection) -> Result<Vec<ProfileRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, image, name, niche, aboutme,
                COALESCE(reward_links, '[]'), COALESCE(secondary_links, '[]'), ecommerce
         FROM accounts
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ProfileRow {
                username: row.get(0)?,
                image: row.get(1)?,
                name: row.get(2)?,
                niche: row.get(3)?,
                aboutme: row.get(4)?,
                reward_links: row.get(5)?,
                secondary_links: row.get(6)?,
                ecommerce: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to list profiles")?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("accounts.db"), 4).unwrap();
        (dir, db)
    }

    fn update(username: &str, image: Option<&str>) -> ProfileUpdate {
        ProfileUpdate {
            username: username.to_string(),
            niche: "fitness".to_string(),
            name: "Jane".to_string(),
            aboutme: Some("hello".to_string()),
            image: image.map(str::to_string),
        }
    }

    async fn account_count(db: &Database, email: &str) -> i64 {
        let email = email.to_string();
        db.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM accounts WHERE email = ?1",
                [&email],
                |r| r.get(0),
            )?)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn check_creates_once_then_reports_existing() {
        let (_dir, db) = test_db();

        let first = db.check_or_create_account("jane@example.com").await.unwrap();
        let CheckOutcome::Created(id) = first else {
            panic!("expected a new account, got {:?}", first);
        };

        let second = db.check_or_create_account("jane@example.com").await.unwrap();
        assert_eq!(second, CheckOutcome::Existing(id));
        assert_eq!(account_count(&db, "jane@example.com").await, 1);

        let account = db.find_account_by_email("jane@example.com").await.unwrap().unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.username, "jane");
        assert_eq!(account.unique_url, "/jane");
        assert_eq!(account.niche.as_deref(), Some("your_niche_value"));
        assert!(account.image.is_none());
        assert!(account.reward_links.is_empty());
        assert!(account.secondary_links.is_empty());
        assert_eq!(account.ecommerce, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn transactional_check_creates_exactly_one_row_under_contention() {
        let (_dir, db) = test_db();
        let db = db.with_transactional(true);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.check_or_create_account("race@example.com").await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if let CheckOutcome::Created(_) = handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(account_count(&db, "race@example.com").await, 1);
    }

    #[tokio::test]
    async fn username_lookup() {
        let (_dir, db) = test_db();
        db.check_or_create_account("taken@example.com").await.unwrap();

        assert!(db.username_exists("taken").await.unwrap());
        assert!(!db.username_exists("free").await.unwrap());
    }

    #[tokio::test]
    async fn update_without_image_keeps_stored_image() {
        let (_dir, db) = test_db();
        db.check_or_create_account("jane@example.com").await.unwrap();

        let first = db
            .update_profile("jane@example.com", &update("janed", Some("image-1-2.png")))
            .await
            .unwrap();
        assert_eq!(first, UpdateOutcome::Updated { image: Some("image-1-2.png".into()) });

        let second = db
            .update_profile("jane@example.com", &update("jd", None))
            .await
            .unwrap();
        assert_eq!(second, UpdateOutcome::Updated { image: Some("image-1-2.png".into()) });

        let account = db.find_account_by_email("jane@example.com").await.unwrap().unwrap();
        assert_eq!(account.username, "jd");
        assert_eq!(account.unique_url, "/jd");
        assert_eq!(account.image.as_deref(), Some("image-1-2.png"));
        assert_eq!(account.name.as_deref(), Some("Jane"));
        assert_eq!(account.aboutme.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn update_with_image_replaces_it() {
        let (_dir, db) = test_db();
        let db = db.with_transactional(true);
        db.check_or_create_account("jane@example.com").await.unwrap();

        db.update_profile("jane@example.com", &update("jane", Some("old.png")))
            .await
            .unwrap();
        db.update_profile("jane@example.com", &update("jane", Some("new.gif")))
            .await
            .unwrap();

        assert_eq!(
            db.current_image("jane@example.com").await.unwrap(),
            Some(Some("new.gif".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn transactional_update_never_loses_a_new_image() {
        let (_dir, db) = test_db();
        let db = db.with_transactional(true);

        for round in 0..50 {
            let email = format!("user{}@example.com", round);
            db.check_or_create_account(&email).await.unwrap();
            db.update_profile(&email, &update("before", Some("old.png")))
                .await
                .unwrap();

            let with_image = {
                let (db, email) = (db.clone(), email.clone());
                tokio::spawn(async move {
                    db.update_profile(&email, &update("withimage", Some("new.png"))).await
                })
            };
            let without_image = {
                let (db, email) = (db.clone(), email.clone());
                tokio::spawn(async move {
                    db.update_profile(&email, &update("noimage", None)).await
                })
            };
            with_image.await.unwrap().unwrap();
            without_image.await.unwrap().unwrap();

            assert_eq!(
                db.current_image(&email).await.unwrap(),
                Some(Some("new.png".to_string())),
                "round {} lost the uploaded image",
                round
            );
        }
    }

    #[tokio::test]
    async fn update_errors_name_the_failing_step() {
        let (_dir, db) = test_db();
        db.check_or_create_account("jane@example.com").await.unwrap();

        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_update BEFORE UPDATE ON accounts
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let err = db
            .update_profile("jane@example.com", &update("jane", None))
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Step>(), Some(&Step::WriteProfile));

        let transactional = db.clone().with_transactional(true);
        let err = transactional
            .update_profile("jane@example.com", &update("jane", None))
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Step>(), Some(&Step::WriteProfile));
    }

    #[tokio::test]
    async fn insert_errors_name_the_failing_step() {
        let (_dir, db) = test_db();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_insert BEFORE INSERT ON accounts
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let err = db.check_or_create_account("jane@example.com").await.unwrap_err();
        assert_eq!(err.downcast_ref::<Step>(), Some(&Step::Insert));
    }

    #[tokio::test]
    async fn update_of_unknown_email_is_not_found() {
        let (_dir, db) = test_db();
        let outcome = db
            .update_profile("ghost@example.com", &update("ghost", None))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
        assert_eq!(db.current_image("ghost@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn link_columns_default_to_empty_and_round_trip() {
        let (_dir, db) = test_db();
        db.check_or_create_account("jane@example.com").await.unwrap();

        assert_eq!(db.reward_links("jane@example.com").await.unwrap(), Some(vec![]));
        assert_eq!(db.secondary_links("jane@example.com").await.unwrap(), Some(vec![]));
        assert_eq!(db.reward_links("ghost@example.com").await.unwrap(), None);

        let links = vec![LinkEntry::new("a", "x"), LinkEntry::new("b", "y")];
        assert_eq!(db.set_reward_links("jane@example.com", &links).await.unwrap(), 1);
        assert_eq!(db.reward_links("jane@example.com").await.unwrap(), Some(links));

        // the columns are independent
        assert_eq!(db.secondary_links("jane@example.com").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn link_update_for_unknown_email_touches_nothing() {
        let (_dir, db) = test_db();
        let touched = db
            .set_secondary_links("ghost@example.com", &[LinkEntry::new("a", "x")])
            .await
            .unwrap();
        assert_eq!(touched, 0);
    }

    #[tokio::test]
    async fn listing_defaults_null_links_and_fails_on_garbage() {
        let (_dir, db) = test_db();
        db.check_or_create_account("one@example.com").await.unwrap();
        db.check_or_create_account("two@example.com").await.unwrap();
        db.set_secondary_links("two@example.com", &[LinkEntry::new("site", "https://two.dev")])
            .await
            .unwrap();

        let profiles = db.list_profiles().await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].username, "one");
        assert!(profiles[0].reward_links.is_empty());
        assert_eq!(profiles[1].secondary_links, vec![LinkEntry::new("site", "https://two.dev")]);

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET reward_links = 'oops' WHERE email = 'one@example.com'",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(db.list_profiles().await.is_err());
        assert!(db.reward_links("one@example.com").await.is_err());
    }
}
