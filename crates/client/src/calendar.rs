//! Calendar v4: group calendars, events and attendees.
//!
//! Calls run under the tenant token, so the bot is the organizer of every
//! event it creates.

use feishu_core::errors::PlatformError;
use serde_json::{json, Value};
use tracing::info;

use crate::http::{data_of, FeishuClient};
use crate::timestamps::DEFAULT_TIMEZONE;

const CALENDARS_PATH: &str = "/open-apis/calendar/v4/calendars";
const LIST_PAGE_SIZE: &str = "50";

/// Event to create. Times are unix seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarEventDraft {
    pub summary: String,
    pub description: String,
    pub start: i64,
    pub end: i64,
    /// Attach a video conference.
    pub online: bool,
}

impl CalendarEventDraft {
    fn to_payload(&self) -> Value {
        let mut payload = json!({
            "summary": self.summary,
            "description": self.description,
            "start_time": { "timestamp": self.start.to_string(), "timezone": DEFAULT_TIMEZONE },
            "end_time": { "timestamp": self.end.to_string(), "timezone": DEFAULT_TIMEZONE },
            "attendee_ability": "can_see_others",
            "need_notification": true
        });
        if self.online {
            payload["vchat"] = json!({ "vc_type": "vc" });
        }
        payload
    }
}

fn group_calendar_summary(chat_id: &str) -> String {
    format!("GroupCalendar-{chat_id}")
}

fn missing(path: &str, what: &str) -> PlatformError {
    PlatformError::Decode { path: path.to_string(), message: format!("response data has no {what}") }
}

fn events_path(calendar_id: &str) -> String {
    format!("{CALENDARS_PATH}/{calendar_id}/events")
}

impl FeishuClient {
    /// Shared calendar whose summary mentions `chat_id`, created when none of
    /// the first page of visible calendars matches.
    pub async fn group_calendar(&self, chat_id: &str) -> Result<String, PlatformError> {
        let data = data_of(self.get(CALENDARS_PATH, &[("page_size", LIST_PAGE_SIZE)]).await?);
        let existing = data
            .get("calendar_list")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|calendar| {
                calendar.get("type").and_then(Value::as_str) == Some("shared")
                    && calendar
                        .get("summary")
                        .and_then(Value::as_str)
                        .is_some_and(|summary| summary.contains(chat_id))
            })
            .and_then(|calendar| calendar.get("calendar_id").and_then(Value::as_str));
        if let Some(calendar_id) = existing {
            info!(chat_id, calendar_id, "group calendar found");
            return Ok(calendar_id.to_string());
        }

        let body = json!({
            "summary": group_calendar_summary(chat_id),
            "description": format!("Automatically created by the Feishu bridge for group {chat_id}"),
            "permissions": "public"
        });
        let created = data_of(self.post(CALENDARS_PATH, &[], &body).await?);
        let calendar_id = created
            .pointer("/calendar/calendar_id")
            .and_then(Value::as_str)
            .ok_or_else(|| missing(CALENDARS_PATH, "`calendar.calendar_id`"))?;
        info!(chat_id, calendar_id, "group calendar created");
        Ok(calendar_id.to_string())
    }

    /// Returns the created `event` object.
    pub async fn create_calendar_event(
        &self,
        calendar_id: &str,
        draft: &CalendarEventDraft,
    ) -> Result<Value, PlatformError> {
        let path = events_path(calendar_id);
        let data = data_of(self.post(&path, &[], &draft.to_payload()).await?);
        let event = data.get("event").cloned().ok_or_else(|| missing(&path, "`event`"))?;
        info!(
            calendar_id,
            event_id = ?event.get("event_id"),
            summary = %draft.summary,
            online = draft.online,
            "calendar event created"
        );
        Ok(event)
    }

    /// Attendees get the platform's invitation prompt.
    pub async fn add_event_attendees(
        &self,
        calendar_id: &str,
        event_id: &str,
        attendee_open_ids: &[String],
    ) -> Result<Value, PlatformError> {
        let path = format!("{}/{event_id}/attendees", events_path(calendar_id));
        let attendees: Vec<Value> = attendee_open_ids
            .iter()
            .map(|open_id| json!({ "type": "user", "user_id": open_id }))
            .collect();
        let body = json!({ "attendees": attendees, "need_notification": true });
        let data = data_of(self.post(&path, &[], &body).await?);
        info!(calendar_id, event_id, attendee_count = attendee_open_ids.len(), "attendees added");
        Ok(data)
    }

    /// First page of events, optionally bounded by unix-second times.
    pub async fn list_calendar_events(
        &self,
        calendar_id: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Value>, PlatformError> {
        let start = start.map(|start| start.to_string());
        let end = end.map(|end| end.to_string());
        let mut query = vec![("page_size", LIST_PAGE_SIZE)];
        if let Some(start) = &start {
            query.push(("start_time", start.as_str()));
        }
        if let Some(end) = &end {
            query.push(("end_time", end.as_str()));
        }

        let data = data_of(self.get(&events_path(calendar_id), &query).await?);
        Ok(items_of(data))
    }
}

/// `items` array of a list response, empty when absent.
pub(crate) fn items_of(data: Value) -> Vec<Value> {
    match data {
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::CalendarEventDraft;
    use crate::http::FeishuClient;
    use crate::token::StaticToken;

    fn client(server: &MockServer) -> FeishuClient {
        FeishuClient::new(reqwest::Client::new(), server.uri(), Arc::new(StaticToken::new("t-test")))
    }

    fn ok(data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success", "data": data }))
    }

    fn draft(online: bool) -> CalendarEventDraft {
        CalendarEventDraft {
            summary: "Sprint review".to_string(),
            description: String::new(),
            start: 1_774_490_400,
            end: 1_774_494_000,
            online,
        }
    }

    #[tokio::test]
    async fn existing_shared_calendar_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open-apis/calendar/v4/calendars"))
            .and(query_param("page_size", "50"))
            .respond_with(ok(json!({
                "calendar_list": [
                    { "type": "primary", "summary": "oc_team", "calendar_id": "cal_primary" },
                    { "type": "shared", "summary": "GroupCalendar-oc_team", "calendar_id": "cal_team" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST")).respond_with(ok(json!({}))).expect(0).mount(&server).await;

        let calendar_id = client(&server).group_calendar("oc_team").await.expect("calendar");

        assert_eq!(calendar_id, "cal_team");
    }

    #[tokio::test]
    async fn missing_group_calendar_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open-apis/calendar/v4/calendars"))
            .respond_with(ok(json!({ "calendar_list": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/open-apis/calendar/v4/calendars"))
            .and(body_partial_json(json!({
                "summary": "GroupCalendar-oc_new",
                "permissions": "public"
            })))
            .respond_with(ok(json!({ "calendar": { "calendar_id": "cal_new" } })))
            .expect(1)
            .mount(&server)
            .await;

        let calendar_id = client(&server).group_calendar("oc_new").await.expect("calendar");

        assert_eq!(calendar_id, "cal_new");
    }

    #[tokio::test]
    async fn online_events_carry_a_video_conference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/calendar/v4/calendars/cal_team/events"))
            .and(body_json(json!({
                "summary": "Sprint review",
                "description": "",
                "start_time": { "timestamp": "1774490400", "timezone": "Asia/Shanghai" },
                "end_time": { "timestamp": "1774494000", "timezone": "Asia/Shanghai" },
                "attendee_ability": "can_see_others",
                "need_notification": true,
                "vchat": { "vc_type": "vc" }
            })))
            .respond_with(ok(json!({ "event": { "event_id": "evt_1" } })))
            .expect(1)
            .mount(&server)
            .await;

        let event =
            client(&server).create_calendar_event("cal_team", &draft(true)).await.expect("event");

        assert_eq!(event["event_id"], "evt_1");
    }

    #[tokio::test]
    async fn attendees_are_users_with_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/calendar/v4/calendars/cal_team/events/evt_1/attendees"))
            .and(body_json(json!({
                "attendees": [
                    { "type": "user", "user_id": "ou_a" },
                    { "type": "user", "user_id": "ou_b" }
                ],
                "need_notification": true
            })))
            .respond_with(ok(json!({ "attendees": [] })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .add_event_attendees("cal_team", "evt_1", &["ou_a".to_string(), "ou_b".to_string()])
            .await
            .expect("attendees added");
    }

    #[tokio::test]
    async fn event_listing_passes_time_bounds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open-apis/calendar/v4/calendars/cal_team/events"))
            .and(query_param("start_time", "1774490400"))
            .and(query_param("page_size", "50"))
            .respond_with(ok(json!({ "items": [{ "event_id": "evt_1" }] })))
            .expect(1)
            .mount(&server)
            .await;

        let events = client(&server)
            .list_calendar_events("cal_team", Some(1_774_490_400), None)
            .await
            .expect("events");

        assert_eq!(events, vec![json!({ "event_id": "evt_1" })]);
    }

    #[tokio::test]
    async fn create_without_event_object_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/calendar/v4/calendars/cal_team/events"))
            .respond_with(ok(json!({})))
            .mount(&server)
            .await;

        let error = client(&server)
            .create_calendar_event("cal_team", &draft(false))
            .await
            .expect_err("no event");

        assert!(error.to_string().contains("`event`"), "{error}");
    }
}
