use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Admin {
    pub id: Id,
    pub username: String,
    // Argon2id PHC string, never plaintext. Admin records never leave the
    // repository layer; login responds with id + username only.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres-store", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres-store", sqlx(type_name = "text", rename_all = "lowercase"))]
pub enum BookingStatus {
    Unread,
    Read,
    Contacted,
}

impl BookingStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unread" => Some(Self::Unread),
            "read" => Some(Self::Read),
            "contacted" => Some(Self::Contacted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Booking {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub event_type: String,
    pub message: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewBooking {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub event_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Event {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub date: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewEvent {
    pub name: String,
    pub slug: String,
    pub date: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Photo {
    pub id: Id,
    pub event_id: Id,
    pub url: String,
    pub storage_key: String,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPhoto {
    pub event_id: Id,
    pub url: String,
    pub storage_key: String,
    pub original_name: String,
}

/// One active remote image for a page slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImageRef {
    pub url: String,
    pub public_id: String,
}

/// section -> image_id -> ImageRef. The whole map is the unit of persistence.
pub type ImageConfig = HashMap<String, HashMap<String, ImageRef>>;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GalleryImage {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub url: String,
    pub public_id: String,
}
