use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait AdminRepo: Send + Sync {
    async fn find_admin(&self, username: &str) -> RepoResult<Admin>;
    /// Insert or update the stored password hash. Used by startup bootstrap;
    /// admins are never deleted in-app.
    async fn upsert_admin(&self, username: &str, password_hash: &str) -> RepoResult<Admin>;
}

#[async_trait]
pub trait BookingRepo: Send + Sync {
    async fn create_booking(&self, new: NewBooking) -> RepoResult<Booking>;
    async fn list_bookings(&self) -> RepoResult<Vec<Booking>>;
    async fn update_booking_status(&self, id: Id, status: BookingStatus) -> RepoResult<Booking>;
}

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn create_event(&self, new: NewEvent) -> RepoResult<Event>;
    async fn list_events(&self) -> RepoResult<Vec<Event>>;
    async fn get_event(&self, id: Id) -> RepoResult<Event>;
    async fn get_event_by_slug(&self, slug: &str) -> RepoResult<Event>;
}

#[async_trait]
pub trait PhotoRepo: Send + Sync {
    async fn add_photo(&self, new: NewPhoto) -> RepoResult<Photo>;
    async fn list_photos(&self, event_id: Id) -> RepoResult<Vec<Photo>>;
    /// Most recently uploaded photos, newest first. Backing for the
    /// placeholder match engine.
    async fn recent_photos(&self, limit: usize) -> RepoResult<Vec<Photo>>;
}

pub trait Repo: AdminRepo + BookingRepo + EventRepo + PhotoRepo {}

impl<T> Repo for T where T: AdminRepo + BookingRepo + EventRepo + PhotoRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/studio.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        admins: HashMap<Id, Admin>,
        bookings: HashMap<Id, Booking>,
        events: HashMap<Id, Event>,
        photos: HashMap<Id, Photo>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("AF_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("studio.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl AdminRepo for InMemRepo {
        async fn find_admin(&self, username: &str) -> RepoResult<Admin> {
            let s = self.state.read().unwrap();
            s.admins
                .values()
                .find(|a| a.username == username)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
        async fn upsert_admin(&self, username: &str, password_hash: &str) -> RepoResult<Admin> {
            let mut s = self.state.write().unwrap();
            let admin = if let Some(existing) = s.admins.values_mut().find(|a| a.username == username) {
                existing.password_hash = password_hash.to_string();
                existing.clone()
            } else {
                let id = Self::next_id(&mut s);
                let admin = Admin {
                    id,
                    username: username.to_string(),
                    password_hash: password_hash.to_string(),
                    created_at: Utc::now(),
                };
                s.admins.insert(id, admin.clone());
                admin
            };
            drop(s);
            self.persist();
            Ok(admin)
        }
    }

    #[async_trait]
    impl BookingRepo for InMemRepo {
        async fn create_booking(&self, new: NewBooking) -> RepoResult<Booking> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let booking = Booking {
                id,
                name: new.name,
                email: new.email,
                phone: new.phone,
                event_type: new.event_type,
                message: new.message,
                status: BookingStatus::Unread,
                created_at: Utc::now(),
            };
            s.bookings.insert(id, booking.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(booking)
        }
        async fn list_bookings(&self) -> RepoResult<Vec<Booking>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.bookings.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
        async fn update_booking_status(&self, id: Id, status: BookingStatus) -> RepoResult<Booking> {
            let mut s = self.state.write().unwrap();
            let booking = s.bookings.get_mut(&id).ok_or(RepoError::NotFound)?;
            booking.status = status;
            let updated = booking.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl EventRepo for InMemRepo {
        async fn create_event(&self, new: NewEvent) -> RepoResult<Event> {
            let mut s = self.state.write().unwrap();
            if s.events.values().any(|e| e.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let event = Event {
                id,
                name: new.name,
                slug: new.slug,
                date: new.date,
                location: new.location,
                created_at: Utc::now(),
            };
            s.events.insert(id, event.clone());
            drop(s);
            self.persist();
            Ok(event)
        }
        async fn list_events(&self) -> RepoResult<Vec<Event>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.events.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
        async fn get_event(&self, id: Id) -> RepoResult<Event> {
            let s = self.state.read().unwrap();
            s.events.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_event_by_slug(&self, slug: &str) -> RepoResult<Event> {
            let s = self.state.read().unwrap();
            s.events
                .values()
                .find(|e| e.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PhotoRepo for InMemRepo {
        async fn add_photo(&self, new: NewPhoto) -> RepoResult<Photo> {
            let mut s = self.state.write().unwrap();
            if !s.events.contains_key(&new.event_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let photo = Photo {
                id,
                event_id: new.event_id,
                url: new.url,
                storage_key: new.storage_key,
                original_name: new.original_name,
                uploaded_at: Utc::now(),
            };
            s.photos.insert(id, photo.clone());
            drop(s);
            self.persist();
            Ok(photo)
        }
        async fn list_photos(&self, event_id: Id) -> RepoResult<Vec<Photo>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .photos
                .values()
                .filter(|p| p.event_id == event_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
            Ok(v)
        }
        async fn recent_photos(&self, limit: usize) -> RepoResult<Vec<Photo>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.photos.values().cloned().collect();
            v.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
            v.truncate(limit);
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[async_trait]
    impl AdminRepo for PgRepo {
        async fn find_admin(&self, username: &str) -> RepoResult<Admin> {
            sqlx::query_as::<_, Admin>(
                "SELECT id, username, password_hash, created_at FROM admins WHERE username = $1",
            )
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn upsert_admin(&self, username: &str, password_hash: &str) -> RepoResult<Admin> {
            sqlx::query_as::<_, Admin>(
                "INSERT INTO admins (username, password_hash) VALUES ($1, $2)
                 ON CONFLICT (username) DO UPDATE SET password_hash = EXCLUDED.password_hash
                 RETURNING id, username, password_hash, created_at",
            )
            .bind(username)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl BookingRepo for PgRepo {
        async fn create_booking(&self, new: NewBooking) -> RepoResult<Booking> {
            sqlx::query_as::<_, Booking>(
                "INSERT INTO bookings (name, email, phone, event_type, message, status)
                 VALUES ($1, $2, $3, $4, $5, 'unread')
                 RETURNING id, name, email, phone, event_type, message, status, created_at",
            )
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.phone)
            .bind(&new.event_type)
            .bind(&new.message)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn list_bookings(&self) -> RepoResult<Vec<Booking>> {
            sqlx::query_as::<_, Booking>(
                "SELECT id, name, email, phone, event_type, message, status, created_at
                 FROM bookings ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn update_booking_status(&self, id: Id, status: BookingStatus) -> RepoResult<Booking> {
            sqlx::query_as::<_, Booking>(
                "UPDATE bookings SET status = $2 WHERE id = $1
                 RETURNING id, name, email, phone, event_type, message, status, created_at",
            )
            .bind(id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl EventRepo for PgRepo {
        async fn create_event(&self, new: NewEvent) -> RepoResult<Event> {
            sqlx::query_as::<_, Event>(
                "INSERT INTO events (name, slug, date, location) VALUES ($1, $2, $3, $4)
                 RETURNING id, name, slug, date, location, created_at",
            )
            .bind(&new.name)
            .bind(&new.slug)
            .bind(&new.date)
            .bind(&new.location)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn list_events(&self) -> RepoResult<Vec<Event>> {
            sqlx::query_as::<_, Event>(
                "SELECT id, name, slug, date, location, created_at FROM events ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn get_event(&self, id: Id) -> RepoResult<Event> {
            sqlx::query_as::<_, Event>(
                "SELECT id, name, slug, date, location, created_at FROM events WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn get_event_by_slug(&self, slug: &str) -> RepoResult<Event> {
            sqlx::query_as::<_, Event>(
                "SELECT id, name, slug, date, location, created_at FROM events WHERE slug = $1",
            )
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl PhotoRepo for PgRepo {
        async fn add_photo(&self, new: NewPhoto) -> RepoResult<Photo> {
            sqlx::query_as::<_, Photo>(
                "INSERT INTO photos (event_id, url, storage_key, original_name)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, event_id, url, storage_key, original_name, uploaded_at",
            )
            .bind(new.event_id)
            .bind(&new.url)
            .bind(&new.storage_key)
            .bind(&new.original_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                // FK violation on event_id reads as a missing event
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => RepoError::NotFound,
                other => map_err(other),
            })
        }
        async fn list_photos(&self, event_id: Id) -> RepoResult<Vec<Photo>> {
            sqlx::query_as::<_, Photo>(
                "SELECT id, event_id, url, storage_key, original_name, uploaded_at
                 FROM photos WHERE event_id = $1 ORDER BY uploaded_at ASC",
            )
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }
        async fn recent_photos(&self, limit: usize) -> RepoResult<Vec<Photo>> {
            sqlx::query_as::<_, Photo>(
                "SELECT id, event_id, url, storage_key, original_name, uploaded_at
                 FROM photos ORDER BY uploaded_at DESC LIMIT $1",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }
    }
}
