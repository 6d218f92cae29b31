//! SQLite persistence for accounts, the token ledger and the itinerary tree.
//!
//! This module provides functionality for:
//! - Registering and authenticating users (bcrypt password hashes).
//! - Reading and changing a user's token balance with a guarded decrement.
//! - Storing tours with their days, activities and photos, and loading the whole
//!   graph back as a [`UserProfile`].
//!
//! Paid writes (generated tours, blogs, photos, videos) charge the balance inside
//! the same transaction as the write, so a failed write never costs tokens and a
//! too-small balance never produces a write.

use bcrypt::{hash, verify};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::tour::{Activity, Day, NewTour, Photo, Tour};
use crate::user::{UserProfile, UserRecord};

const BCRYPT_COST: u32 = 7;

/// Database wrapper that provides an interface for the whole domain.
#[derive(Clone, Debug)]
pub struct Database {
    pub pool: Arc<SqlitePool>,
}

impl Database {
    /// Creates a new database instance with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Database {
            pool: Arc::new(pool),
        }
    }

    /// Opens a pool for `url`, creating the database file if needed.
    ///
    /// `sqlite::memory:` is only coherent with `max_connections = 1`, since every
    /// connection gets its own private in-memory database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!("Connected to database {url}");
        Ok(Self::new(pool))
    }

    /// Creates any missing tables.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(include_str!("../schema.sql"))
            .execute(&*self.pool)
            .await?;
        info!("Database schema ready");
        Ok(())
    }

    // ----------------------------------------------------------------- users

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name, email, password, token FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Registers a new user; the password is hashed before it is stored.
    ///
    /// # Returns
    /// * `Ok(i64)` - The id of the new user.
    /// * `Err(sqlx::Error)` - If the insertion fails (e.g., duplicate email).
    pub async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<i64, sqlx::Error> {
        let hashed_password = hash(password, BCRYPT_COST)
            .map_err(|_| sqlx::Error::Protocol("Failed to hash password".to_string()))?;

        let result = sqlx::query("INSERT INTO users (name, email, password, token) VALUES (?1, ?2, ?3, 0)")
            .bind(name)
            .bind(email)
            .bind(&hashed_password)
            .execute(&*self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Authenticates a user by email and password.
    ///
    /// # Returns
    /// * `Ok(Some(UserRecord))` - If the password matches the stored hash.
    /// * `Ok(None)` - If the user is unknown or the password is wrong.
    pub async fn authenticate_user(&self, email: &str, password: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let Some(user) = self.find_user_by_email(email).await? else {
            return Ok(None);
        };

        let matches = verify(password, &user.password_hash)
            .map_err(|_| sqlx::Error::Protocol("Failed to verify password".to_string()))?;

        Ok(matches.then_some(user))
    }

    // ---------------------------------------------------------------- ledger

    pub async fn token_balance(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT token FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&*self.pool)
            .await?;
        row.try_get("token")
    }

    /// Credits `amount` tokens and returns the new balance.
    ///
    /// # Returns
    /// * `Ok(Some(i64))` - The new balance.
    /// * `Ok(None)` - The credit would overflow the balance; nothing changed.
    pub async fn add_tokens(&self, user_id: i64, amount: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query(
            "UPDATE users SET token = token + ?1 WHERE id = ?2 AND token <= ?3 - ?1 RETURNING token",
        )
        .bind(amount)
        .bind(user_id)
        .bind(i64::MAX)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(|row| row.try_get("token")).transpose()
    }

    /// Debits `amount` tokens if the balance covers it.
    ///
    /// # Returns
    /// * `Ok(Some(i64))` - The new balance.
    /// * `Ok(None)` - The balance was too low; nothing changed.
    pub async fn deduct_tokens(&self, user_id: i64, amount: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("UPDATE users SET token = token - ?1 WHERE id = ?2 AND token >= ?1 RETURNING token")
            .bind(amount)
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|row| row.try_get("token")).transpose()
    }

    // ----------------------------------------------------------------- tours

    /// Loads the user together with every tour, day, activity and photo they own.
    pub async fn load_profile(&self, user_id: i64) -> Result<Option<UserProfile>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name, email, token FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tour_ids: Vec<i64> = sqlx::query("SELECT id FROM tours WHERE user_id = ?1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&*self.pool)
            .await?
            .iter()
            .map(|r| r.get("id"))
            .collect();

        let mut tours = Vec::with_capacity(tour_ids.len());
        for tour_id in tour_ids {
            if let Some(tour) = self.get_tour(tour_id).await? {
                tours.push(tour);
            }
        }

        Ok(Some(UserProfile {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            token: row.try_get("token")?,
            tours,
        }))
    }

    /// Gets a tour with its days, activities and photos, each ordered by id.
    pub async fn get_tour(&self, tour_id: i64) -> Result<Option<Tour>, sqlx::Error> {
        let tour_row = sqlx::query(
            "SELECT id, title, start_location, destination, start_date, end_date, budget, video, blog
             FROM tours WHERE id = ?1",
        )
        .bind(tour_id)
        .fetch_optional(&*self.pool)
        .await?;

        let Some(tour_row) = tour_row else {
            return Ok(None);
        };

        let day_rows = sqlx::query("SELECT id, date FROM days WHERE tour_id = ?1 ORDER BY id")
            .bind(tour_id)
            .fetch_all(&*self.pool)
            .await?;

        let mut days = Vec::with_capacity(day_rows.len());
        for day_row in day_rows {
            let day_id: i64 = day_row.try_get("id")?;

            let activities = sqlx::query("SELECT id, description, status FROM activities WHERE day_id = ?1 ORDER BY id")
                .bind(day_id)
                .fetch_all(&*self.pool)
                .await?
                .iter()
                .map(|r| {
                    Ok(Activity {
                        id: r.try_get("id")?,
                        description: r.try_get("description")?,
                        status: r.try_get("status")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;

            let photos = sqlx::query("SELECT id, link FROM photos WHERE day_id = ?1 ORDER BY id")
                .bind(day_id)
                .fetch_all(&*self.pool)
                .await?
                .iter()
                .map(|r| {
                    Ok(Photo {
                        id: r.try_get("id")?,
                        link: r.try_get("link")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;

            days.push(Day {
                id: day_id,
                date: day_row.try_get("date")?,
                activities,
                photos,
            });
        }

        Ok(Some(Tour {
            id: tour_row.try_get("id")?,
            title: tour_row.try_get("title")?,
            start_location: tour_row.try_get("start_location")?,
            destination: tour_row.try_get("destination")?,
            start_date: tour_row.try_get("start_date")?,
            end_date: tour_row.try_get("end_date")?,
            budget: tour_row.try_get("budget")?,
            video: tour_row.try_get("video")?,
            blog: tour_row.try_get("blog")?,
            days,
        }))
    }

    /// Owner of a tour, or `None` if the tour does not exist.
    pub async fn tour_owner(&self, tour_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT user_id FROM tours WHERE id = ?1")
            .bind(tour_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| r.try_get("user_id")).transpose()
    }

    pub async fn day_owner(&self, day_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT t.user_id FROM days d JOIN tours t ON t.id = d.tour_id WHERE d.id = ?1")
            .bind(day_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| r.try_get("user_id")).transpose()
    }

    pub async fn activity_owner(&self, activity_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT t.user_id FROM activities a
             JOIN days d ON d.id = a.day_id
             JOIN tours t ON t.id = d.tour_id
             WHERE a.id = ?1",
        )
        .bind(activity_id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(|r| r.try_get("user_id")).transpose()
    }

    /// Stores a tour with all of its days and activities, charging `cost` tokens.
    ///
    /// # Returns
    /// * `Ok(Some(i64))` - The id of the new tour.
    /// * `Ok(None)` - The balance did not cover `cost`; nothing was written.
    pub async fn create_tour(&self, user_id: i64, tour: &NewTour, cost: i64) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !charge(&mut tx, user_id, cost).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let tour_id = sqlx::query(
            "INSERT INTO tours (user_id, title, start_location, destination, start_date, end_date, budget)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(user_id)
        .bind(&tour.title)
        .bind(&tour.start_location)
        .bind(&tour.destination)
        .bind(&tour.start_date)
        .bind(&tour.end_date)
        .bind(&tour.budget)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for day in &tour.days {
            let day_id = sqlx::query("INSERT INTO days (tour_id, date) VALUES (?1, ?2)")
                .bind(tour_id)
                .bind(&day.date)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            for description in &day.activities {
                sqlx::query("INSERT INTO activities (day_id, description, status) VALUES (?1, ?2, 'pending')")
                    .bind(day_id)
                    .bind(description)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        debug!(tour_id, user_id, days = tour.days.len(), cost, "tour created");
        Ok(Some(tour_id))
    }

    pub async fn update_tour_title(&self, tour_id: i64, title: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tours SET title = ?1 WHERE id = ?2")
            .bind(title)
            .bind(tour_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// Deletes a tour together with its days, activities and photos.
    ///
    /// # Returns
    /// * `Ok(bool)` - True if the tour existed and was deleted.
    pub async fn delete_tour(&self, tour_id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM photos WHERE day_id IN (SELECT id FROM days WHERE tour_id = ?1)")
            .bind(tour_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM activities WHERE day_id IN (SELECT id FROM days WHERE tour_id = ?1)")
            .bind(tour_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM days WHERE tour_id = ?1")
            .bind(tour_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tours WHERE id = ?1")
            .bind(tour_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------ activities/photos

    pub async fn add_activity(&self, day_id: i64, description: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO activities (day_id, description, status) VALUES (?1, ?2, 'pending')")
            .bind(day_id)
            .bind(description)
            .execute(&*self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn complete_activity(&self, activity_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE activities SET status = 'done' WHERE id = ?1")
            .bind(activity_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_photo(&self, day_id: i64, link: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO photos (day_id, link) VALUES (?1, ?2)")
            .bind(day_id)
            .bind(link)
            .execute(&*self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Records an uploaded photo and charges `cost` tokens for it.
    pub async fn add_photo_charged(&self, user_id: i64, day_id: i64, link: &str, cost: i64) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !charge(&mut tx, user_id, cost).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let photo_id = sqlx::query("INSERT INTO photos (day_id, link) VALUES (?1, ?2)")
            .bind(day_id)
            .bind(link)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        tx.commit().await?;
        Ok(Some(photo_id))
    }

    /// Stores a generated blog on the tour and charges `cost` tokens for it.
    pub async fn save_blog_charged(&self, user_id: i64, tour_id: i64, blog: &str, cost: i64) -> Result<bool, sqlx::Error> {
        self.set_tour_column_charged(user_id, tour_id, TourColumn::Blog, blog, cost).await
    }

    /// Stores a rendered video URL on the tour and charges `cost` tokens for it.
    pub async fn save_video_charged(&self, user_id: i64, tour_id: i64, video_url: &str, cost: i64) -> Result<bool, sqlx::Error> {
        self.set_tour_column_charged(user_id, tour_id, TourColumn::Video, video_url, cost).await
    }

    async fn set_tour_column_charged(&self, user_id: i64, tour_id: i64, column: TourColumn, value: &str, cost: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !charge(&mut tx, user_id, cost).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        let sql = match column {
            TourColumn::Blog => "UPDATE tours SET blog = ?1 WHERE id = ?2",
            TourColumn::Video => "UPDATE tours SET video = ?1 WHERE id = ?2",
        };
        sqlx::query(sql)
            .bind(value)
            .bind(tour_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

enum TourColumn {
    Blog,
    Video,
}

/// Guarded decrement: succeeds only when the balance covers `amount`.
async fn charge(conn: &mut SqliteConnection, user_id: i64, amount: i64) -> Result<bool, sqlx::Error> {
    if amount <= 0 {
        return Ok(true);
    }

    let result = sqlx::query("UPDATE users SET token = token - ?1 WHERE id = ?2 AND token >= ?1")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

fn user_from_row(row: &SqliteRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        token: row.try_get("token")?,
    })
}
