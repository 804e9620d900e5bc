use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Amenity, Bills, Furnished, ListingStatus, Presence, ReportKind, ReportStatus, RoomType,
};

// -- Session token --

/// Claims carried in the bearer token. `sid` names the server-side session
/// row, so a token stops working once that row is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub exp: usize,
}

/// Plain acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Accounts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub student_id: String,
    pub course: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub student_id: String,
    pub course: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub presence: Presence,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

/// Public presence entry. Carries no profile details beyond name and email.
#[derive(Debug, Clone, Serialize)]
pub struct OnlineUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub presence: Presence,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub online_users: Vec<OnlineUser>,
    pub count: usize,
}

/// Denormalized reference to another account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

// -- Listings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListingRequest {
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub postcode: String,
    pub distance_to_transport: String,
    pub price_pence: i64,
    pub deposit_pence: i64,
    pub bills: Bills,
    pub room_type: RoomType,
    pub furnished: Furnished,
    pub available_from: NaiveDate,
    #[serde(default = "default_min_stay")]
    pub min_stay_months: i64,
    #[serde(default = "default_max_stay")]
    pub max_stay_months: i64,
    /// Stored image references, in display order.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub amenities: BTreeSet<Amenity>,
}

fn default_min_stay() -> i64 {
    6
}

fn default_max_stay() -> i64 {
    12
}

/// Partial update: absent fields are left unchanged. `images`, when present,
/// replaces every slot.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub postcode: Option<String>,
    pub distance_to_transport: Option<String>,
    pub price_pence: Option<i64>,
    pub deposit_pence: Option<i64>,
    pub bills: Option<Bills>,
    pub room_type: Option<RoomType>,
    pub furnished: Option<Furnished>,
    pub available_from: Option<NaiveDate>,
    pub min_stay_months: Option<i64>,
    pub max_stay_months: Option<i64>,
    pub images: Option<Vec<String>>,
    pub amenities: Option<BTreeSet<Amenity>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListingQuery {
    pub location: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub room_type: Option<RoomType>,
    pub furnished: Option<Furnished>,
    pub bills: Option<Bills>,
    pub amenity: Option<Amenity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_email: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub postcode: String,
    pub distance_to_transport: String,
    pub price_pence: i64,
    pub deposit_pence: i64,
    pub bills: Bills,
    pub room_type: RoomType,
    pub furnished: Furnished,
    pub available_from: NaiveDate,
    pub min_stay_months: i64,
    pub max_stay_months: i64,
    /// Resolved public locations of the filled image slots.
    pub images: Vec<String>,
    pub amenities: BTreeSet<Amenity>,
    pub status: ListingStatus,
    pub is_featured: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListingsResponse {
    pub listings: Vec<ListingResponse>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingRef {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Value to place in a listing's `images`.
    pub reference: String,
    pub url: String,
    pub size: u64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    /// Omit to address the owner of `listing_id`.
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender: UserSummary,
    pub recipient: UserSummary,
    pub listing: Option<ListingRef>,
    pub subject: String,
    pub content: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub messages: Vec<MessageResponse>,
    pub count: usize,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageResponse>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LastMessage {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_from_me: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub other_user: UserSummary,
    pub listing: Option<ListingRef>,
    pub last_message: LastMessage,
    pub message_count: usize,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationResponse>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub other_user_id: Uuid,
    /// Absent means the conversation not tied to any listing.
    #[serde(default)]
    pub listing_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub messages: Vec<MessageResponse>,
    pub count: usize,
    pub other_user: UserSummary,
}

// -- Favorites --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FavoriteRequest {
    pub listing_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct FavoriteStatus {
    pub is_favorited: bool,
}

// -- Reports --

/// `report_type` stays a string here so an unknown kind is reported as a
/// field error listing the accepted values.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReportRequest {
    pub listing_id: Uuid,
    #[serde(default)]
    pub report_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct CreateReportResponse {
    pub message: String,
    pub report_id: Uuid,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReportedListing {
    pub id: Uuid,
    pub title: String,
    pub location: String,
    pub price_pence: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub id: Uuid,
    pub report_type: ReportKind,
    pub report_type_display: &'static str,
    pub description: String,
    pub status: ReportStatus,
    pub status_display: &'static str,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` once the listing row no longer exists.
    pub listing: Option<ReportedListing>,
    /// Moderator view only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<UserSummary>,
    /// Moderator view only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub reports: Vec<ReportResponse>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerationQuery {
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionReportsRequest {
    pub report_ids: Vec<Uuid>,
    pub status: ReportStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionReportsResponse {
    pub outcomes: Vec<TransitionOutcome>,
    pub updated: usize,
}
