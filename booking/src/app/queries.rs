//! Read side of the booking service.

use super::BookingService;
use super::service::observe;
use crate::availability::TimeSlot;
use crate::error::BookingResult;
use crate::game::Game;
use crate::store::GameQuery;
use crate::error::BookingError;
use crate::types::{
    Court, CourtId, CourtStatus, GameId, GameStatus, GeoPoint, NearbyCourt, Page, PageRequest,
    PlayerId, SkillLevel, SportType, TimeWindow,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use courtbook_core::store::with_timeout;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Narrowing for [`BookingService::upcoming_games`].
#[derive(Clone, Debug, Default)]
pub struct UpcomingFilter {
    /// Earliest start; defaults to now
    pub from: Option<DateTime<Utc>>,
    /// Latest start (exclusive); defaults to [`UpcomingFilter::DEFAULT_WINDOW_DAYS`] after `from`
    pub to: Option<DateTime<Utc>>,
    /// Only this court
    pub court: Option<CourtId>,
    /// Only this sport
    pub sport: Option<SportType>,
}

impl UpcomingFilter {
    /// Length of the default window
    pub const DEFAULT_WINDOW_DAYS: i64 = 7;
}

/// Radius search for [`BookingService::courts_near`] and [`BookingService::games_near`].
#[derive(Clone, Debug)]
pub struct NearbyFilter {
    /// Search center
    pub center: GeoPoint,
    /// Search radius; the default depends on the query
    pub radius_meters: Option<u32>,
    /// Only courts offering this sport, or games of it
    pub sport: Option<SportType>,
    /// Only games at this level. Courts ignore it.
    pub skill_level: Option<SkillLevel>,
    /// How many days ahead to look for games, defaults to
    /// [`UpcomingFilter::DEFAULT_WINDOW_DAYS`]. Courts ignore it.
    pub days: Option<u32>,
}

impl NearbyFilter {
    /// Smallest accepted radius
    pub const MIN_RADIUS_METERS: u32 = 100;
    /// Largest accepted radius
    pub const MAX_RADIUS_METERS: u32 = 50_000;
    /// Radius used by [`BookingService::courts_near`] when none is given
    pub const DEFAULT_COURT_RADIUS_METERS: u32 = 5_000;
    /// Radius used by [`BookingService::games_near`] when none is given
    pub const DEFAULT_GAME_RADIUS_METERS: u32 = 10_000;
    /// Longest look-ahead for games
    pub const MAX_DAYS: u32 = 30;

    /// Search around `center` with every default.
    #[must_use]
    pub const fn around(center: GeoPoint) -> Self {
        Self {
            center,
            radius_meters: None,
            sport: None,
            skill_level: None,
            days: None,
        }
    }

    fn radius(&self, default: u32) -> Result<f64, BookingError> {
        let radius = self.radius_meters.unwrap_or(default);
        if !(Self::MIN_RADIUS_METERS..=Self::MAX_RADIUS_METERS).contains(&radius) {
            return Err(BookingError::Validation(format!(
                "Radius {radius} m is outside {}..={} m",
                Self::MIN_RADIUS_METERS,
                Self::MAX_RADIUS_METERS
            )));
        }
        Ok(f64::from(radius))
    }

    fn days(&self) -> Result<i64, BookingError> {
        let days = self
            .days
            .map_or(UpcomingFilter::DEFAULT_WINDOW_DAYS, i64::from);
        if !(1..=i64::from(Self::MAX_DAYS)).contains(&days) {
            return Err(BookingError::Validation(format!(
                "Look-ahead of {days} days is outside 1..={}",
                Self::MAX_DAYS
            )));
        }
        Ok(days)
    }
}

/// Game counts for a time window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GameStats {
    /// Games starting in the window
    pub total: usize,
    /// By effective status
    pub by_status: BTreeMap<GameStatus, usize>,
    /// By sport
    pub by_sport: BTreeMap<SportType, usize>,
    /// By skill level
    pub by_skill_level: BTreeMap<SkillLevel, usize>,
}

impl GameStats {
    fn count(&mut self, game: &Game, now: DateTime<Utc>) {
        self.total += 1;
        *self.by_status.entry(game.effective_status(now)).or_default() += 1;
        *self.by_sport.entry(game.sport.clone()).or_default() += 1;
        *self.by_skill_level.entry(game.skill_level).or_default() += 1;
    }
}

impl BookingService {
    /// Look up a game.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::NotFound`] or [`crate::BookingError::System`].
    #[instrument(skip(self))]
    pub async fn get_game(&self, game_id: GameId) -> BookingResult<Game> {
        observe("get_game", self.load_game(game_id).await)
    }

    /// Look up a court.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::NotFound`] or [`crate::BookingError::System`].
    #[instrument(skip(self))]
    pub async fn get_court(&self, court_id: CourtId) -> BookingResult<Court> {
        observe("get_court", self.load_court(court_id).await)
    }

    /// Booked slots of a court on a local date.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::NotFound`] for an unknown court or
    /// [`crate::BookingError::System`].
    #[instrument(skip(self))]
    pub async fn court_schedule(&self, court_id: CourtId, date: NaiveDate) -> BookingResult<Vec<TimeSlot>> {
        observe("court_schedule", self.try_court_schedule(court_id, date).await)
    }

    /// Games a player created or plays in, by start time.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::System`] if the game store fails.
    #[instrument(skip(self))]
    pub async fn games_for_player(&self, player: PlayerId, page: PageRequest) -> BookingResult<Page<Game>> {
        let result = with_timeout(self.timeout(), self.games.list(GameQuery::ForPlayer(player), page))
            .await
            .map_err(Into::into);
        observe("games_for_player", result)
    }

    /// Scheduled games starting soon, by start time.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::Validation`] for an empty window or
    /// [`crate::BookingError::System`].
    #[instrument(skip(self))]
    pub async fn upcoming_games(&self, filter: UpcomingFilter, page: PageRequest) -> BookingResult<Page<Game>> {
        observe("upcoming_games", self.try_upcoming_games(filter, page).await)
    }

    /// Active courts around a point, nearest first.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::Validation`] for a radius outside
    /// [`NearbyFilter::MIN_RADIUS_METERS`]..=[`NearbyFilter::MAX_RADIUS_METERS`], or
    /// [`crate::BookingError::System`].
    #[instrument(skip(self))]
    pub async fn courts_near(&self, filter: NearbyFilter, page: PageRequest) -> BookingResult<Page<NearbyCourt>> {
        observe("courts_near", self.try_courts_near(filter, page).await)
    }

    /// Scheduled games at active courts around a point, by start time.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::Validation`] for a radius or look-ahead out of
    /// range, or [`crate::BookingError::System`].
    #[instrument(skip(self))]
    pub async fn games_near(&self, filter: NearbyFilter, page: PageRequest) -> BookingResult<Page<Game>> {
        observe("games_near", self.try_games_near(filter, page).await)
    }

    /// Counts of games starting inside `window`.
    ///
    /// # Errors
    ///
    /// [`crate::BookingError::System`] if the game store fails.
    #[instrument(skip(self))]
    pub async fn game_stats(&self, window: TimeWindow) -> BookingResult<GameStats> {
        observe("game_stats", self.try_game_stats(window).await)
    }

    async fn try_court_schedule(&self, court_id: CourtId, date: NaiveDate) -> BookingResult<Vec<TimeSlot>> {
        let court = self.load_court(court_id).await?;
        let slots = self.availability.booked_slots(court.id, date).await?;
        debug!(booked = slots.len(), "Loaded court schedule");
        Ok(slots)
    }

    async fn try_upcoming_games(&self, filter: UpcomingFilter, page: PageRequest) -> BookingResult<Page<Game>> {
        let from = filter.from.unwrap_or_else(|| self.clock.now());
        let to = filter
            .to
            .unwrap_or(from + Duration::days(UpcomingFilter::DEFAULT_WINDOW_DAYS));
        let window = TimeWindow::new(from, to)?;
        let query = GameQuery::Upcoming {
            from: window.from,
            to: window.to,
            court: filter.court,
            sport: filter.sport,
        };
        Ok(with_timeout(self.timeout(), self.games.list(query, page)).await?)
    }

    async fn active_courts_near(&self, filter: &NearbyFilter, default_radius: u32) -> BookingResult<Vec<NearbyCourt>> {
        let radius = filter.radius(default_radius)?;
        let mut found = with_timeout(self.timeout(), self.courts.within(filter.center, radius)).await?;
        found.retain(|nearby| {
            nearby.court.status == CourtStatus::Active
                && filter
                    .sport
                    .as_ref()
                    .is_none_or(|sport| nearby.court.sport_types.contains(sport))
        });
        Ok(found)
    }

    async fn try_courts_near(&self, filter: NearbyFilter, page: PageRequest) -> BookingResult<Page<NearbyCourt>> {
        let courts = self
            .active_courts_near(&filter, NearbyFilter::DEFAULT_COURT_RADIUS_METERS)
            .await?;
        debug!(found = courts.len(), "Found nearby courts");
        Ok(Page::from_sorted(courts, page))
    }

    async fn try_games_near(&self, filter: NearbyFilter, page: PageRequest) -> BookingResult<Page<Game>> {
        let days = filter.days()?;
        let courts: Vec<CourtId> = self
            .active_courts_near(&filter, NearbyFilter::DEFAULT_GAME_RADIUS_METERS)
            .await?
            .into_iter()
            .map(|nearby| nearby.court.id)
            .collect();
        if courts.is_empty() {
            return Ok(Page::from_sorted(Vec::new(), page));
        }

        let from = self.clock.now();
        let window = TimeWindow::new(from, from + Duration::days(days))?;
        let query = GameQuery::AtCourts {
            courts,
            from: window.from,
            to: window.to,
            sport: filter.sport,
            skill_level: filter.skill_level,
        };
        Ok(with_timeout(self.timeout(), self.games.list(query, page)).await?)
    }

    async fn try_game_stats(&self, window: TimeWindow) -> BookingResult<GameStats> {
        let now = self.clock.now();
        let query = GameQuery::StartingBetween {
            from: window.from,
            to: window.to,
        };
        let mut stats = GameStats::default();
        let mut request = PageRequest::new(1, PageRequest::MAX_PER_PAGE)?;
        loop {
            let page = with_timeout(self.timeout(), self.games.list(query.clone(), request)).await?;
            for game in &page.items {
                stats.count(game, now);
            }
            if !page.has_more() {
                break;
            }
            request = request.next();
        }
        debug!(total = stats.total, "Computed game stats");
        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_has_no_bounds() {
        let filter = UpcomingFilter::default();
        assert!(filter.from.is_none() && filter.to.is_none());
        assert!(filter.court.is_none() && filter.sport.is_none());
    }

    #[test]
    fn stats_serialize_with_wire_names() {
        let mut stats = GameStats::default();
        stats.by_status.insert(GameStatus::InProgress, 2);
        stats.by_sport.insert(SportType::new("tennis").unwrap(), 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_status"]["in_progress"], 2);
        assert_eq!(json["by_sport"]["tennis"], 1);
    }
}
