//! Google Calendar API client
//!
//! A thin pass-through over the primary calendar's events. Nothing is cached.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::auth::GoogleApiAuthorizer;

/// Start or end of an event: a point in time or a whole day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    DateTime {
        #[serde(rename = "dateTime")]
        date_time: String,
        #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none", default)]
        time_zone: Option<String>,
    },
    Date {
        date: String,
    },
}

impl EventTime {
    pub fn all_day(date: NaiveDate) -> Self {
        EventTime::Date {
            date: date.format("%Y-%m-%d").to_string(),
        }
    }

    /// The `dateTime` or `date` value, whichever is set
    pub fn as_str(&self) -> &str {
        match self {
            EventTime::DateTime { date_time, .. } => date_time,
            EventTime::Date { date } => date,
        }
    }
}

/// A calendar event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsListResponse {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

/// Calendar client for the authorized user's primary calendar
pub struct CalendarClient {
    auth: GoogleApiAuthorizer,
}

impl CalendarClient {
    const BASE_URL: &'static str = "https://www.googleapis.com/calendar/v3";

    pub fn new(auth: GoogleApiAuthorizer) -> Self {
        Self { auth }
    }

    /// Upcoming single events starting at `min_time`, ordered by start time
    pub fn list_events(&self, min_time: DateTime<Utc>, max_results: usize) -> Result<Vec<CalendarEvent>> {
        let access_token = self.auth.get_access_token()?;

        let url = format!(
            "{}/calendars/primary/events?timeMin={}&maxResults={}&singleEvents=true&orderBy=startTime",
            Self::BASE_URL,
            urlencoding::encode(&min_time.to_rfc3339()),
            max_results
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send list events request")?;

        let list: EventsListResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list events response")?;

        if list.items.is_empty() {
            warn!("No upcoming events found.");
        }
        for event in &list.items {
            info!("EVENT: {} {}", event.start.as_str(), event.summary);
        }
        Ok(list.items)
    }

    /// Insert an event spanning whole days; `end` is exclusive
    pub fn create_all_day_event(
        &self,
        summary: &str,
        description: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CalendarEvent> {
        let access_token = self.auth.get_access_token()?;
        let event = all_day_event(summary, description, start, end);

        let url = format!("{}/calendars/primary/events", Self::BASE_URL);
        let mut response = ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_json(&event)
            .context("Failed to send create event request")?;

        let created: CalendarEvent = response
            .body_mut()
            .read_json()
            .context("Failed to parse created event")?;

        info!("Event created: {}", created.html_link.as_deref().unwrap_or("<no link>"));
        Ok(created)
    }
}

fn all_day_event(summary: &str, description: &str, start: NaiveDate, end: NaiveDate) -> CalendarEvent {
    CalendarEvent {
        id: None,
        summary: summary.to_string(),
        description: Some(description.to_string()),
        start: EventTime::all_day(start),
        end: EventTime::all_day(end),
        location: None,
        html_link: None,
    }
}
