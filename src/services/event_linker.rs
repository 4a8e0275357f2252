//! Event linking
//!
//! Associates a customer's canonical phone identity with calendar events
//! from the external booking system, under the same match precedence the
//! import reconciliation uses.

use chrono::{DateTime, Utc};

use crate::identity::{extract_embedded_phone, normalize_phone, CanonicalIdentity, Country};
use crate::services::matcher::identity_match;
use crate::types::{CalendarEvent, LinkedEvents};

/// Filter `events` down to the ones belonging to `identity` and partition
/// them around `now`: upcoming soonest-first, past most-recent-first.
/// Cancelled events are never linked.
pub fn link_events(
    identity: &CanonicalIdentity,
    events: Vec<CalendarEvent>,
    now: DateTime<Utc>,
    home: &Country,
) -> LinkedEvents {
    if !identity.is_matchable() {
        return LinkedEvents::default();
    }

    let mut upcoming = Vec::new();
    let mut past = Vec::new();

    for event in events {
        if event.is_cancelled() {
            continue;
        }
        let raw_phone = match event_phone(&event) {
            Some(phone) => phone,
            None => continue,
        };
        let event_identity = normalize_phone(&raw_phone, home);
        if identity_match(identity, &event_identity).is_none() {
            continue;
        }
        if event.start >= now {
            upcoming.push(event);
        } else {
            past.push(event);
        }
    }

    upcoming.sort_by_key(|e| e.start);
    past.sort_by(|a, b| b.start.cmp(&a.start));

    LinkedEvents { upcoming, past }
}

/// An event's phone: the dedicated field when present, else a `Phone:` line
/// embedded in the description blob.
fn event_phone(event: &CalendarEvent) -> Option<String> {
    if let Some(phone) = event.phone.as_deref() {
        if !phone.trim().is_empty() {
            return Some(phone.to_string());
        }
    }
    let embedded = extract_embedded_phone(event.description.as_deref().unwrap_or(""));
    if embedded.is_empty() {
        None
    } else {
        Some(embedded)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::identity::country_by_alpha2;

    fn us() -> &'static Country {
        country_by_alpha2("US").unwrap()
    }

    fn event(phone: Option<&str>, start: DateTime<Utc>, status: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            id: None,
            title: None,
            phone: phone.map(|s| s.to_string()),
            description: None,
            start,
            status: status.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_cross_format_phone_links() {
        // Customer stored as "11234567890", event formatted "(123) 456-7890":
        // both normalize to last10 "1234567890".
        let customer = normalize_phone("11234567890", us());
        let now = Utc::now();
        let events = vec![event(Some("(123) 456-7890"), now + Duration::days(1), None)];

        let linked = link_events(&customer, events, now, us());
        assert_eq!(linked.upcoming.len(), 1);
        assert!(linked.past.is_empty());
    }

    #[test]
    fn test_partition_and_ordering() {
        let customer = normalize_phone("(212) 555-1234", us());
        let now = Utc::now();
        let yesterday = event(Some("212-555-1234"), now - Duration::days(1), None);
        let in_three_days = event(Some("2125551234"), now + Duration::days(3), None);
        let tomorrow = event(Some("+1 212 555 1234"), now + Duration::days(1), None);
        let last_week = event(Some("2125551234"), now - Duration::days(7), None);

        let linked = link_events(
            &customer,
            vec![in_three_days.clone(), last_week.clone(), tomorrow.clone(), yesterday.clone()],
            now,
            us(),
        );

        // Upcoming soonest first, past most recent first.
        assert_eq!(linked.upcoming, vec![tomorrow, in_three_days]);
        assert_eq!(linked.past, vec![yesterday, last_week]);
    }

    #[test]
    fn test_cancelled_events_excluded() {
        let customer = normalize_phone("212-555-1234", us());
        let now = Utc::now();
        let events = vec![
            event(Some("212-555-1234"), now + Duration::days(1), Some("cancelled")),
            event(Some("212-555-1234"), now + Duration::days(2), Some("Cancelled")),
            event(Some("212-555-1234"), now + Duration::days(3), Some("confirmed")),
        ];

        let linked = link_events(&customer, events, now, us());
        assert_eq!(linked.upcoming.len(), 1);
    }

    #[test]
    fn test_embedded_phone_fallback() {
        let customer = normalize_phone("212-555-1234", us());
        let now = Utc::now();
        let mut booked = event(None, now + Duration::days(2), None);
        booked.description =
            Some("Exterior detail\nPhone: (212) 555-1234\nVehicle: Camry".to_string());

        let linked = link_events(&customer, vec![booked], now, us());
        assert_eq!(linked.upcoming.len(), 1);
    }

    #[test]
    fn test_unrelated_and_phoneless_events_ignored() {
        let customer = normalize_phone("212-555-1234", us());
        let now = Utc::now();
        let events = vec![
            event(Some("914-555-0000"), now + Duration::days(1), None),
            event(None, now + Duration::days(1), None),
        ];

        let linked = link_events(&customer, events, now, us());
        assert!(linked.upcoming.is_empty());
        assert!(linked.past.is_empty());
    }

    #[test]
    fn test_customer_without_phone_links_nothing() {
        let no_phone = CanonicalIdentity::none();
        let now = Utc::now();
        let events = vec![event(Some("212-555-1234"), now + Duration::days(1), None)];

        let linked = link_events(&no_phone, events, now, us());
        assert!(linked.upcoming.is_empty());
    }

    #[test]
    fn test_last10_fallback_links_across_countries() {
        // The customer's GB number and an event number with no derivable
        // E.164 share last10 "2071234567"; the weak key links them.
        let gb = country_by_alpha2("GB").unwrap();
        let customer = normalize_phone("+44 20 7123 4567", gb);
        let now = Utc::now();
        let ambiguous = event(Some("207-123-4567"), now + Duration::days(1), None);

        let linked = link_events(&customer, vec![ambiguous], now, us());
        assert_eq!(linked.upcoming.len(), 1);
    }
}
