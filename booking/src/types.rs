//! Domain types for the court booking engine.
//!
//! Identifiers, value objects and the court entity. Games, rosters and
//! reminders live in their own modules next to the logic that owns them.

use crate::error::BookingError;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a court
    CourtId
);
uuid_id!(
    /// Unique identifier for a game
    GameId
);
uuid_id!(
    /// Unique identifier for a player (issued by the identity collaborator)
    PlayerId
);
uuid_id!(
    /// Unique identifier for a scheduled reminder
    ReminderId
);
uuid_id!(
    /// Unique identifier for an immediate notification
    NotificationId
);

// ============================================================================
// Sports and game attributes
// ============================================================================

/// A sport a court supports and a game is played as (`basketball`, `volleyball`, ...).
///
/// Stored lower-cased so `"Basketball"` and `"basketball"` are the same sport.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SportType(String);

impl SportType {
    /// Parse a sport name.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if the name is blank.
    pub fn new(name: impl AsRef<str>) -> Result<Self, BookingError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(BookingError::Validation("Sport type cannot be empty".to_string()));
        }
        Ok(Self(name.to_lowercase()))
    }

    /// The normalized sport name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SportType {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SportType> for String {
    fn from(sport: SportType) -> Self {
        sport.0
    }
}

impl fmt::Display for SportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a game is played.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameFormat {
    /// Three against three
    #[serde(rename = "3x3")]
    ThreeOnThree,
    /// Five against five
    #[serde(rename = "5x5")]
    FiveOnFive,
    /// Pick-up play without fixed teams
    #[serde(rename = "freestyle")]
    Freestyle,
    /// Drills and practice
    #[serde(rename = "training")]
    Training,
    /// Anything else
    #[serde(rename = "other")]
    Other,
}

impl GameFormat {
    /// Wire name of the format
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThreeOnThree => "3x3",
            Self::FiveOnFive => "5x5",
            Self::Freestyle => "freestyle",
            Self::Training => "training",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for GameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameFormat {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3x3" => Ok(Self::ThreeOnThree),
            "5x5" => Ok(Self::FiveOnFive),
            "freestyle" => Ok(Self::Freestyle),
            "training" => Ok(Self::Training),
            "other" => Ok(Self::Other),
            other => Err(BookingError::Validation(format!("Unknown game format: {other}"))),
        }
    }
}

/// Expected skill level of a game's players.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    /// New players
    Beginner,
    /// Regular players
    Intermediate,
    /// Experienced players
    Advanced,
    /// Everyone welcome
    #[default]
    Any,
}

impl SkillLevel {
    /// Wire name of the skill level
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a game.
///
/// ```text
/// scheduled ──(start)──▶ in_progress ──(end)──▶ completed
///     │
///     └──(cancel)──▶ cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Open for joining, not started yet
    Scheduled,
    /// Start time has passed, end time has not
    InProgress,
    /// End time has passed (terminal)
    Completed,
    /// Cancelled by its creator or an administrator (terminal)
    Cancelled,
}

impl GameStatus {
    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition can leave this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Location
// ============================================================================

/// A WGS84 coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees east, -180..=180
    pub longitude: f64,
    /// Degrees north, -90..=90
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if either coordinate is out of range or not finite.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, BookingError> {
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(BookingError::Validation(format!(
                "Longitude {longitude} is outside -180..=180"
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(BookingError::Validation(format!(
                "Latitude {latitude} is outside -90..=90"
            )));
        }
        Ok(Self { longitude, latitude })
    }

    /// Great-circle distance to `other` in meters, by the haversine formula.
    #[must_use]
    pub fn distance_meters(&self, other: &Self) -> f64 {
        let (lat_a, lat_b) = (self.latitude.to_radians(), other.latitude.to_radians());
        let half_dlat = (lat_b - lat_a) / 2.0;
        let half_dlon = (other.longitude - self.longitude).to_radians() / 2.0;
        let h = half_dlat.sin().powi(2) + lat_a.cos() * lat_b.cos() * half_dlon.sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
    }
}

/// Mean Earth radius
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Where a court is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Coordinates
    pub point: GeoPoint,
    /// Human-readable street address
    pub address: String,
}

/// A court found by a radius search, with its distance from the search center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyCourt {
    /// The court
    pub court: Court,
    /// Meters from the search center
    pub distance_meters: f64,
}

// ============================================================================
// Time slots and working hours
// ============================================================================

/// Minutes in a calendar day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A half-open `[start, end)` range of minutes within one calendar day.
///
/// `end_minute` may be 1440 to mean "until midnight".
///
/// # Examples
///
/// ```
/// use courtbook::types::SlotRange;
///
/// let ten_to_eleven = SlotRange::new(600, 660).unwrap();
/// let eleven_to_noon = SlotRange::new(660, 720).unwrap();
/// assert!(!ten_to_eleven.overlaps(&eleven_to_noon));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    start_minute: u16,
    end_minute: u16,
}

impl SlotRange {
    /// Create a range.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] unless `start < end <= 1440`.
    pub fn new(start_minute: u16, end_minute: u16) -> Result<Self, BookingError> {
        if start_minute >= end_minute || end_minute > MINUTES_PER_DAY {
            return Err(BookingError::Validation(format!(
                "Invalid time range {start_minute}..{end_minute} (minutes of day)"
            )));
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    /// First minute inside the range
    #[must_use]
    pub const fn start_minute(&self) -> u16 {
        self.start_minute
    }

    /// First minute after the range
    #[must_use]
    pub const fn end_minute(&self) -> u16 {
        self.end_minute
    }

    /// Length of the range in minutes
    #[must_use]
    pub const fn len_minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }

    /// Half-open overlap test: touching endpoints do not overlap.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start_minute < other.end_minute && other.start_minute < self.end_minute
    }

    /// Whether `other` lies entirely inside this range
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.start_minute <= other.start_minute && other.end_minute <= self.end_minute
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start_minute / 60,
            self.start_minute % 60,
            self.end_minute / 60,
            self.end_minute % 60
        )
    }
}

/// Opening hours of a court for each day of the week, in court-local time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Indexed by `Weekday::num_days_from_monday()`
    days: [SlotRange; 7],
}

impl WorkingHours {
    /// Default opening time, 08:00
    pub const DEFAULT_OPEN: u16 = 8 * 60;
    /// Default closing time, 22:00
    pub const DEFAULT_CLOSE: u16 = 22 * 60;

    /// The same hours every day of the week
    #[must_use]
    pub const fn every_day(hours: SlotRange) -> Self {
        Self { days: [hours; 7] }
    }

    /// Replace the hours of one weekday
    #[must_use]
    pub fn with_day(mut self, day: Weekday, hours: SlotRange) -> Self {
        self.days[day.num_days_from_monday() as usize] = hours;
        self
    }

    /// Opening hours on `day`
    #[must_use]
    pub fn on(&self, day: Weekday) -> SlotRange {
        self.days[day.num_days_from_monday() as usize]
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self::every_day(SlotRange {
            start_minute: Self::DEFAULT_OPEN,
            end_minute: Self::DEFAULT_CLOSE,
        })
    }
}

// ============================================================================
// Court
// ============================================================================

/// Operational status of a court. Only active courts accept bookings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourtStatus {
    /// Open for bookings
    #[default]
    Active,
    /// Closed
    Inactive,
    /// Temporarily closed for repairs
    Maintenance,
    /// Registered, awaiting approval
    PendingApproval,
}

/// A bookable court.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Court {
    /// Court identity
    pub id: CourtId,
    /// Display name
    pub name: String,
    /// Where the court is
    pub location: Location,
    /// Sports that can be played here
    pub sport_types: BTreeSet<SportType>,
    /// IANA timezone the court's calendar dates are computed in
    pub timezone: Tz,
    /// Opening hours
    pub working_hours: WorkingHours,
    /// Operational status
    pub status: CourtStatus,
    /// Administrator who registered the court
    pub created_by: PlayerId,
    /// When the court was registered
    pub created_at: DateTime<Utc>,
}

impl Court {
    /// Whether games of `sport` can be played on this court
    #[must_use]
    pub fn supports(&self, sport: &SportType) -> bool {
        self.sport_types.contains(sport)
    }

    /// Map a UTC start instant and a duration onto the court's local calendar.
    ///
    /// Returns the local date and the minute-of-day range the game occupies.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if the game would run past local
    /// midnight, span a daylight saving change, or fall outside the court's
    /// working hours.
    pub fn local_slot(
        &self,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<(NaiveDate, SlotRange), BookingError> {
        let local_start = start.with_timezone(&self.timezone);
        let local_end = (start + chrono::Duration::minutes(i64::from(duration_minutes)))
            .with_timezone(&self.timezone);
        let date = local_start.date_naive();

        let start_minute = minute_of_day(local_start.hour(), local_start.minute());
        let end_minute = if local_end.date_naive() == date {
            minute_of_day(local_end.hour(), local_end.minute())
        } else if Some(local_end.date_naive()) == date.succ_opt()
            && local_end.hour() == 0
            && local_end.minute() == 0
        {
            MINUTES_PER_DAY
        } else {
            return Err(BookingError::Validation(
                "Game must end on the same day it starts".to_string(),
            ));
        };

        let range = SlotRange::new(start_minute, end_minute)?;
        // A wall-clock span across a DST change is longer or shorter than the
        // game and would not cover it.
        if u32::from(range.len_minutes()) != duration_minutes {
            return Err(BookingError::Validation(format!(
                "Game time {range} on {date} spans a daylight saving change"
            )));
        }
        let hours = self.working_hours.on(date.weekday());
        if !hours.contains(&range) {
            return Err(BookingError::Validation(format!(
                "Game time {range} is outside the court's working hours {hours} on {date}"
            )));
        }
        Ok((date, range))
    }
}

#[allow(clippy::cast_possible_truncation)] // hour < 24, minute < 60
const fn minute_of_day(hour: u32, minute: u32) -> u16 {
    (hour * 60 + minute) as u16
}

// ============================================================================
// Identity
// ============================================================================

/// Role of an authenticated caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular player
    #[default]
    User,
    /// Administrator
    Admin,
}

/// The authenticated caller of an orchestrator operation, trusted verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Who is calling
    pub player: PlayerId,
    /// With which role
    pub role: Role,
}

impl Actor {
    /// A regular player
    #[must_use]
    pub const fn user(player: PlayerId) -> Self {
        Self {
            player,
            role: Role::User,
        }
    }

    /// An administrator
    #[must_use]
    pub const fn admin(player: PlayerId) -> Self {
        Self {
            player,
            role: Role::Admin,
        }
    }

    /// Whether the caller has administrative rights
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// A 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    /// Largest accepted page size
    pub const MAX_PER_PAGE: u32 = 100;

    /// Create a page request.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if `page` is 0 or `per_page` is outside 1..=100.
    pub fn new(page: u32, per_page: u32) -> Result<Self, BookingError> {
        if page == 0 {
            return Err(BookingError::Validation("Page numbers start at 1".to_string()));
        }
        if per_page == 0 || per_page > Self::MAX_PER_PAGE {
            return Err(BookingError::Validation(format!(
                "Page size must be between 1 and {}",
                Self::MAX_PER_PAGE
            )));
        }
        Ok(Self { page, per_page })
    }

    /// The requested page number (1-based)
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// The requested page size
    #[must_use]
    pub const fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Number of items to skip
    #[must_use]
    pub const fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }

    /// The page after this one
    #[must_use]
    pub const fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            per_page: self.per_page,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

/// One page of query results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of matching items across all pages
    pub total: usize,
    /// This page's number (1-based)
    pub page: u32,
    /// Page size used
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Slice a fully materialized, already sorted result set.
    #[must_use]
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.per_page() as usize)
            .collect();
        Self {
            items,
            total,
            page: request.page(),
            per_page: request.per_page(),
        }
    }

    /// Number of pages needed for `total` items
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page as usize)
    }

    /// Whether a later page exists
    #[must_use]
    pub const fn has_more(&self) -> bool {
        (self.page as usize) < self.total_pages()
    }
}

/// A `[from, to)` window of instants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound
    pub from: DateTime<Utc>,
    /// Exclusive upper bound
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if `from` is not before `to`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, BookingError> {
        if from >= to {
            return Err(BookingError::Validation(
                "Time window must end after it starts".to_string(),
            ));
        }
        Ok(Self { from, to })
    }

    /// Whether `instant` falls inside the window
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}
