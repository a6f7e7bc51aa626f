//! RSVP Engine - attendance responses for scheduled events.
//!
//! An event keeps three exclusive membership sets (attending, not attending,
//! undecided) keyed by connection identity, plus the identity → display name
//! index used to collapse devices of one person.
//!
//! Casting the response a person already holds withdraws it, so every button
//! in the UI is a toggle.

use crate::error::{InvariantViolation, Result};
use crate::identity::{
    collect_orphans, ensure_context, identities_named, purge_by_name, purge_identity,
    ConnectionId, DisplayName, IdentityContainer, NameIndex,
};
use crate::reducer::Reducer;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An attendance answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Response {
    Attend,
    NotAttend,
    Undecided,
}

impl Response {
    pub const ALL: [Response; 3] = [Response::Attend, Response::NotAttend, Response::Undecided];

    pub fn label(&self) -> &'static str {
        match self {
            Response::Attend => "attending",
            Response::NotAttend => "not attending",
            Response::Undecided => "undecided",
        }
    }
}

impl std::str::FromStr for Response {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attend" | "yes" | "attending" => Ok(Response::Attend),
            "notattend" | "not-attend" | "no" => Ok(Response::NotAttend),
            "undecided" | "maybe" => Ok(Response::Undecided),
            other => Err(format!("unknown response: {}", other)),
        }
    }
}

/// A scheduled event carrying RSVP state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attending: BTreeSet<ConnectionId>,
    #[serde(default)]
    pub not_attending: BTreeSet<ConnectionId>,
    #[serde(default)]
    pub undecided: BTreeSet<ConnectionId>,
    #[serde(default)]
    pub display_name_of: NameIndex,
}

/// One RSVP request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpAction {
    pub identity: ConnectionId,
    pub name: DisplayName,
    pub response: Response,
}

impl RsvpAction {
    pub fn new(identity: impl Into<String>, name: impl Into<String>, response: Response) -> Self {
        Self {
            identity: ConnectionId::new(identity),
            name: DisplayName::new(name),
            response,
        }
    }
}

/// Display names grouped by answer, sorted for rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub attending: Vec<DisplayName>,
    pub not_attending: Vec<DisplayName>,
    pub undecided: Vec<DisplayName>,
}

impl Roster {
    pub fn total(&self) -> usize {
        self.attending.len() + self.not_attending.len() + self.undecided.len()
    }
}

impl Event {
    /// Create an event with empty RSVP state.
    pub fn new(id: impl Into<String>, title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            date,
            time: None,
            location: None,
            description: None,
            attending: BTreeSet::new(),
            not_attending: BTreeSet::new(),
            undecided: BTreeSet::new(),
            display_name_of: BTreeMap::new(),
        }
    }

    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The membership set for an answer.
    pub fn members(&self, response: Response) -> &BTreeSet<ConnectionId> {
        match response {
            Response::Attend => &self.attending,
            Response::NotAttend => &self.not_attending,
            Response::Undecided => &self.undecided,
        }
    }

    fn members_mut(&mut self, response: Response) -> &mut BTreeSet<ConnectionId> {
        match response {
            Response::Attend => &mut self.attending,
            Response::NotAttend => &mut self.not_attending,
            Response::Undecided => &mut self.undecided,
        }
    }

    /// Cast, switch or withdraw a response.
    ///
    /// Re-casting the response the display name already holds withdraws it.
    /// Any other response first purges the display name (and the acting
    /// identity) from all three sets, then records the acting identity.
    pub fn cast_response(
        &self,
        identity: &ConnectionId,
        name: &DisplayName,
        response: Response,
    ) -> Result<Event> {
        ensure_context(identity, name)?;

        let mut next = self.clone();
        let holds_response = identities_named(&self.display_name_of, name)
            .iter()
            .any(|holder| self.members(response).contains(holder));

        next.purge_name(name);
        if !holds_response {
            next.purge_identity(identity);
            next.members_mut(response).insert(identity.clone());
            next.display_name_of.insert(identity.clone(), name.clone());
        }
        next.collect_garbage();

        Ok(next)
    }

    fn purge_name(&mut self, name: &DisplayName) -> BTreeSet<ConnectionId> {
        let mut containers: [&mut dyn IdentityContainer; 3] =
            [&mut self.attending, &mut self.not_attending, &mut self.undecided];
        purge_by_name(&mut containers, &mut self.display_name_of, name)
    }

    fn purge_identity(&mut self, identity: &ConnectionId) {
        let mut containers: [&mut dyn IdentityContainer; 3] =
            [&mut self.attending, &mut self.not_attending, &mut self.undecided];
        purge_identity(&mut containers, &mut self.display_name_of, identity);
    }

    /// Restore the event invariants after a field-level merge.
    ///
    /// An identity found in several sets keeps the first of attending, not
    /// attending, undecided. Members without a display name are dropped, as
    /// are names without members. A display name held by several identities
    /// keeps the lowest identity.
    pub fn collect_garbage(&mut self) {
        let attending = self.attending.clone();
        self.not_attending.retain(|id| !attending.contains(id));
        let not_attending = self.not_attending.clone();
        self.undecided
            .retain(|id| !attending.contains(id) && !not_attending.contains(id));

        let names = self.display_name_of.clone();
        for response in Response::ALL {
            self.members_mut(response).retain(|id| names.contains_key(id));
        }

        let mut seen: BTreeSet<DisplayName> = BTreeSet::new();
        let duplicates: Vec<ConnectionId> = self
            .display_name_of
            .iter()
            .filter(|(_, name)| !seen.insert((*name).clone()))
            .map(|(id, _)| id.clone())
            .collect();
        for identity in &duplicates {
            self.purge_identity(identity);
        }

        let containers: [&dyn IdentityContainer; 3] =
            [&self.attending, &self.not_attending, &self.undecided];
        collect_orphans(&containers, &mut self.display_name_of);
    }

    /// The answer currently held by a display name.
    pub fn response_of(&self, name: &DisplayName) -> Option<Response> {
        let holders = identities_named(&self.display_name_of, name);
        Response::ALL
            .into_iter()
            .find(|response| holders.iter().any(|id| self.members(*response).contains(id)))
    }

    /// Display names grouped by answer.
    pub fn roster(&self) -> Roster {
        let names_in = |set: &BTreeSet<ConnectionId>| {
            let mut names: Vec<DisplayName> = set
                .iter()
                .filter_map(|id| self.display_name_of.get(id).cloned())
                .collect();
            names.sort();
            names
        };

        Roster {
            attending: names_in(&self.attending),
            not_attending: names_in(&self.not_attending),
            undecided: names_in(&self.undecided),
        }
    }

    /// Number of people attending.
    pub fn headcount(&self) -> usize {
        self.attending.len()
    }
}

impl Reducer for Event {
    type Action = RsvpAction;

    fn reduce(&self, action: &Self::Action) -> Result<Self> {
        self.cast_response(&action.identity, &action.name, action.response)
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        let mut members: BTreeSet<&ConnectionId> = BTreeSet::new();
        for response in Response::ALL {
            for id in self.members(response) {
                if !members.insert(id) {
                    return Err(InvariantViolation::OverlappingSets(id.to_string()));
                }
                if !self.display_name_of.contains_key(id) {
                    return Err(InvariantViolation::MissingName(id.to_string()));
                }
            }
        }

        let mut names: BTreeSet<&DisplayName> = BTreeSet::new();
        for (id, name) in &self.display_name_of {
            if !members.contains(id) {
                return Err(InvariantViolation::OrphanName(id.to_string()));
            }
            if !names.insert(name) {
                return Err(InvariantViolation::DuplicateName(name.to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event::new(
            "e1",
            "Team dinner",
            NaiveDate::from_ymd_opt(2026, 11, 7).unwrap(),
        )
    }

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    fn name(s: &str) -> DisplayName {
        DisplayName::new(s)
    }

    #[test]
    fn test_new_event_is_empty() {
        let event = event()
            .with_location("Hongdae")
            .with_time(NaiveTime::from_hms_opt(19, 0, 0).unwrap());

        assert!(event.attending.is_empty());
        assert!(event.not_attending.is_empty());
        assert!(event.undecided.is_empty());
        assert!(event.display_name_of.is_empty());
        assert_eq!(event.location.as_deref(), Some("Hongdae"));
        assert!(event.is_consistent());
    }

    #[test]
    fn test_cast_records_identity_and_name() {
        let next = event()
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap();

        assert!(next.attending.contains(&id("u1")));
        assert_eq!(next.display_name_of.get(&id("u1")), Some(&name("Kim")));
        assert_eq!(next.response_of(&name("Kim")), Some(Response::Attend));
        assert!(next.is_consistent());
    }

    #[test]
    fn test_repeat_cast_toggles() {
        let first = event()
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap();
        let second = first
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap();
        let third = second
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap();

        assert_eq!(first.response_of(&name("Kim")), Some(Response::Attend));
        assert_eq!(second.response_of(&name("Kim")), None);
        assert!(second.display_name_of.is_empty());
        assert_eq!(third, first);
    }

    #[test]
    fn test_switch_answer_moves_between_sets() {
        let next = event()
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap()
            .cast_response(&id("u1"), &name("Kim"), Response::Undecided)
            .unwrap();

        assert!(next.attending.is_empty());
        assert!(next.undecided.contains(&id("u1")));
        assert!(next.is_consistent());
    }

    #[test]
    fn test_second_device_supersedes_first() {
        let phone = event()
            .cast_response(&id("A"), &name("지운"), Response::Attend)
            .unwrap();
        let pc = phone
            .cast_response(&id("B"), &name("지운"), Response::NotAttend)
            .unwrap();

        assert!(!pc.attending.contains(&id("A")));
        assert!(!pc.display_name_of.contains_key(&id("A")));
        assert!(pc.not_attending.contains(&id("B")));
        assert_eq!(pc.roster().total(), 1);
        assert!(pc.is_consistent());
    }

    #[test]
    fn test_second_device_same_answer_withdraws() {
        let phone = event()
            .cast_response(&id("A"), &name("지운"), Response::Attend)
            .unwrap();
        let pc = phone
            .cast_response(&id("B"), &name("지운"), Response::Attend)
            .unwrap();

        assert_eq!(pc.response_of(&name("지운")), None);
        assert!(pc.attending.is_empty());
        assert!(pc.display_name_of.is_empty());
    }

    #[test]
    fn test_different_names_coexist() {
        let next = event()
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap()
            .cast_response(&id("u2"), &name("Lee"), Response::Attend)
            .unwrap();

        assert_eq!(next.headcount(), 2);
        assert_eq!(next.roster().attending, vec![name("Kim"), name("Lee")]);
    }

    #[test]
    fn test_rename_on_same_device() {
        let next = event()
            .cast_response(&id("u1"), &name("Kim"), Response::Attend)
            .unwrap()
            .cast_response(&id("u1"), &name("Kimmy"), Response::NotAttend)
            .unwrap();

        assert!(next.attending.is_empty());
        assert_eq!(next.display_name_of.get(&id("u1")), Some(&name("Kimmy")));
        assert!(next.is_consistent());
    }

    #[test]
    fn test_missing_display_name_is_refused() {
        let event = event();
        let result = event.cast_response(&id("u1"), &name("  "), Response::Attend);

        assert!(result.is_err());
        assert!(event.attending.is_empty());
    }

    #[test]
    fn test_collect_garbage_repairs_merged_fields() {
        let mut event = event();
        event.attending.insert(id("a"));
        event.undecided.insert(id("a"));
        event.undecided.insert(id("b"));
        event.not_attending.insert(id("c"));
        event.display_name_of.insert(id("a"), name("Kim"));
        event.display_name_of.insert(id("b"), name("Kim"));
        event.display_name_of.insert(id("z"), name("Ghost"));

        assert!(!event.is_consistent());
        event.collect_garbage();

        assert!(event.is_consistent());
        assert_eq!(event.attending.len(), 1);
        assert!(event.undecided.is_empty());
        assert!(event.not_attending.is_empty());
        assert_eq!(event.display_name_of.len(), 1);
    }

    #[test]
    fn test_reducer_replay() {
        let actions = vec![
            RsvpAction::new("u1", "Kim", Response::Attend),
            RsvpAction::new("u2", "Lee", Response::NotAttend),
            RsvpAction::new("u3", "Kim", Response::Undecided),
        ];

        let result = event().replay(&actions).unwrap();

        assert_eq!(result.response_of(&name("Kim")), Some(Response::Undecided));
        assert_eq!(result.response_of(&name("Lee")), Some(Response::NotAttend));
        assert_eq!(result.roster().total(), 2);
    }

    #[test]
    fn test_serde_missing_collections_default_to_empty() {
        let json = r#"{"id":"e9","title":"Picnic","date":"2026-05-01"}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        assert!(event.attending.is_empty());
        assert!(event.display_name_of.is_empty());
        assert!(event.is_consistent());
    }

    #[test]
    fn test_response_from_str() {
        assert_eq!("attend".parse::<Response>(), Ok(Response::Attend));
        assert_eq!("no".parse::<Response>(), Ok(Response::NotAttend));
        assert!("whatever".parse::<Response>().is_err());
    }
}
