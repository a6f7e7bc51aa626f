//! Poll Engine - single-choice and multi-choice voting.
//!
//! A poll keeps per-option counters, a voter → selected options map and the
//! identity → display name index. The voter map is authoritative: option
//! counts, `total_votes` and `voters` are re-derived from it after every
//! transition, so a stale counter can never outlive the next vote.
//!
//! Two sub-machines, selected by `allow_multiple`:
//! - single-choice: clicking a new option moves the vote, clicking the held
//!   option withdraws it;
//! - multi-choice: each click toggles that one option.

use crate::error::{InvariantViolation, ReconcileError, Result};
use crate::identity::{
    ensure_context, find_by_name, identities_named, purge_identity, ConnectionId, DisplayName,
    IdentityContainer, NameIndex,
};
use crate::reducer::Reducer;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use ulid::Ulid;

/// Identifier of a poll option.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionId(pub String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh, globally unique option id.
    pub fn fresh() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One answer of a poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    #[serde(rename = "optionId")]
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub vote_count: u32,
}

impl PollOption {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(id),
            text: text.into(),
            vote_count: 0,
        }
    }
}

/// Where one logical voter stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoterState {
    NotVoted,
    VotedSingle(OptionId),
    VotedMulti(BTreeSet<OptionId>),
}

/// A poll document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub total_votes: u32,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub allow_add_options: bool,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub voter_selections: BTreeMap<ConnectionId, BTreeSet<OptionId>>,
    #[serde(default)]
    pub voters: BTreeSet<ConnectionId>,
    #[serde(default)]
    pub display_name_of: NameIndex,
}

/// Actions a poll accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PollAction {
    /// Toggle one option on a multi-choice poll.
    Toggle {
        identity: ConnectionId,
        name: DisplayName,
        option: OptionId,
    },
    /// Select (or withdraw) on a single-choice poll.
    Select {
        identity: ConnectionId,
        name: DisplayName,
        option: OptionId,
    },
    /// Whichever of the two the poll's mode calls for.
    Vote {
        identity: ConnectionId,
        name: DisplayName,
        option: OptionId,
    },
    /// Append a new zero-vote option.
    AddOption { option: OptionId, text: String },
}

/// Tally of one option, ready for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub id: OptionId,
    pub text: String,
    pub votes: u32,
    /// Share of `total_votes`, 0.0 to 100.0.
    pub percentage: f64,
    /// Who picked this option; `None` on anonymous polls.
    pub voters: Option<Vec<DisplayName>>,
}

/// Tally of a whole poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    pub question: String,
    pub total_votes: u32,
    pub voter_count: usize,
    pub options: Vec<OptionResult>,
}

impl PollResults {
    /// The options with the most votes (several on a tie, none if no votes).
    pub fn leaders(&self) -> Vec<&OptionResult> {
        let top = self.options.iter().map(|o| o.votes).max().unwrap_or(0);
        if top == 0 {
            return Vec::new();
        }
        self.options.iter().filter(|o| o.votes == top).collect()
    }
}

impl Poll {
    /// Create a single-choice poll with the given options.
    pub fn new(id: impl Into<String>, question: impl Into<String>, options: Vec<PollOption>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            options,
            total_votes: 0,
            allow_multiple: false,
            is_anonymous: false,
            allow_add_options: false,
            end_date: None,
            voter_selections: BTreeMap::new(),
            voters: BTreeSet::new(),
            display_name_of: BTreeMap::new(),
        }
        .with_zeroed_counts()
    }

    /// Create a poll from option texts, generating option ids.
    pub fn from_texts<I, S>(id: impl Into<String>, question: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = texts
            .into_iter()
            .map(|text| PollOption {
                id: OptionId::fresh(),
                text: text.into(),
                vote_count: 0,
            })
            .collect();
        Self::new(id, question, options)
    }

    fn with_zeroed_counts(mut self) -> Self {
        for option in &mut self.options {
            option.vote_count = 0;
        }
        self
    }

    pub fn allow_multiple(mut self, allow: bool) -> Self {
        self.allow_multiple = allow;
        self
    }

    pub fn anonymous(mut self, anonymous: bool) -> Self {
        self.is_anonymous = anonymous;
        self
    }

    pub fn allow_add_options(mut self, allow: bool) -> Self {
        self.allow_add_options = allow;
        self
    }

    pub fn closes_on(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    fn mode(&self) -> &'static str {
        if self.allow_multiple {
            "multi-choice"
        } else {
            "single-choice"
        }
    }

    /// Whether the poll is read-only on `today`.
    ///
    /// The engine never consults the clock; callers apply this check before
    /// every mutating call.
    pub fn is_closed_on(&self, today: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| today > end)
    }

    pub fn option(&self, id: &OptionId) -> Option<&PollOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    fn ensure_option(&self, id: &OptionId) -> Result<()> {
        match self.option(id) {
            Some(_) => Ok(()),
            None => Err(ReconcileError::InvalidTarget(id.to_string())),
        }
    }

    // === Voting ===

    /// Vote the way the poll's mode calls for.
    pub fn vote(&self, identity: &ConnectionId, name: &DisplayName, option: &OptionId) -> Result<Poll> {
        if self.allow_multiple {
            self.toggle_option(identity, name, option)
        } else {
            self.select_option(identity, name, option)
        }
    }

    /// Toggle one option on a multi-choice poll.
    ///
    /// Every identity recorded under `name` is purged along with the acting
    /// identity. The acting identity's own earlier selection is kept and
    /// `option` is flipped in it.
    pub fn toggle_option(
        &self,
        identity: &ConnectionId,
        name: &DisplayName,
        option: &OptionId,
    ) -> Result<Poll> {
        ensure_context(identity, name)?;
        if !self.allow_multiple {
            return Err(ReconcileError::ModeMismatch {
                operation: "toggle_option",
                mode: self.mode(),
            });
        }
        self.ensure_option(option)?;

        let mut next = self.clone();
        let mut selection = next.take_voter(identity, name);
        if !selection.remove(option) {
            selection.insert(option.clone());
        }
        next.record(identity, name, selection);
        next.recount();

        Ok(next)
    }

    /// Select an option on a single-choice poll.
    ///
    /// Selecting the held option withdraws the vote; selecting another one
    /// moves it, leaving `total_votes` unchanged.
    pub fn select_option(
        &self,
        identity: &ConnectionId,
        name: &DisplayName,
        option: &OptionId,
    ) -> Result<Poll> {
        ensure_context(identity, name)?;
        if self.allow_multiple {
            return Err(ReconcileError::ModeMismatch {
                operation: "select_option",
                mode: self.mode(),
            });
        }
        self.ensure_option(option)?;

        let previous = self.single_selection(name);

        let mut next = self.clone();
        next.take_voter(identity, name);
        if previous.as_ref() != Some(option) {
            next.record(identity, name, BTreeSet::from([option.clone()]));
        }
        next.recount();

        Ok(next)
    }

    /// Current single selection recorded under the display name.
    fn single_selection(&self, name: &DisplayName) -> Option<OptionId> {
        find_by_name(&self.display_name_of, name)
            .and_then(|holder| self.voter_selections.get(holder))
            .and_then(|selection| selection.iter().next().cloned())
    }

    /// Remove every trace of the logical voter and return the selection the
    /// acting identity itself held.
    fn take_voter(&mut self, identity: &ConnectionId, name: &DisplayName) -> BTreeSet<OptionId> {
        let mut stale = identities_named(&self.display_name_of, name);
        stale.insert(identity.clone());

        let carried = self.voter_selections.get(identity).cloned().unwrap_or_default();
        for id in &stale {
            let mut containers: [&mut dyn IdentityContainer; 2] =
                [&mut self.voter_selections, &mut self.voters];
            purge_identity(&mut containers, &mut self.display_name_of, id);
        }
        carried
    }

    fn record(&mut self, identity: &ConnectionId, name: &DisplayName, selection: BTreeSet<OptionId>) {
        if selection.is_empty() {
            return;
        }
        self.voter_selections.insert(identity.clone(), selection);
        self.voters.insert(identity.clone());
        self.display_name_of.insert(identity.clone(), name.clone());
    }

    /// Re-derive every aggregate from `voter_selections`.
    ///
    /// Selections of unknown options are dropped, single-choice selections
    /// keep their lowest option, a display name held by several identities
    /// keeps the lowest identity (with the union of their selections), and
    /// names without a selection are dropped.
    pub fn recount(&mut self) {
        let known: BTreeSet<OptionId> = self.options.iter().map(|o| o.id.clone()).collect();
        let single = !self.allow_multiple;

        let mut owner_of: BTreeMap<DisplayName, ConnectionId> = BTreeMap::new();
        let mut merged: BTreeMap<ConnectionId, BTreeSet<OptionId>> = BTreeMap::new();
        for (identity, selection) in std::mem::take(&mut self.voter_selections) {
            let owner = match self.display_name_of.get(&identity) {
                Some(name) => owner_of
                    .entry(name.clone())
                    .or_insert_with(|| identity.clone())
                    .clone(),
                None => identity,
            };
            merged
                .entry(owner)
                .or_default()
                .extend(selection.into_iter().filter(|o| known.contains(o)));
        }

        for selection in merged.values_mut() {
            if single && selection.len() > 1 {
                if let Some(first) = selection.iter().next().cloned() {
                    *selection = BTreeSet::from([first]);
                }
            }
        }
        merged.retain(|_, selection| !selection.is_empty());

        self.voters = merged.keys().cloned().collect();
        self.display_name_of.retain(|identity, _| merged.contains_key(identity));
        self.voter_selections = merged;

        for option in &mut self.options {
            option.vote_count = self
                .voter_selections
                .values()
                .filter(|selection| selection.contains(&option.id))
                .count() as u32;
        }
        self.total_votes = self.options.iter().map(|o| o.vote_count).sum();
    }

    // === Options ===

    /// Append a new option with a fresh id.
    pub fn add_option(&self, text: &str) -> Result<Poll> {
        self.add_option_with_id(OptionId::fresh(), text)
    }

    /// Append a new option with a caller-chosen id.
    pub fn add_option_with_id(&self, id: OptionId, text: &str) -> Result<Poll> {
        if !self.allow_add_options {
            return Err(ReconcileError::OptionsLocked(self.id.clone()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ReconcileError::EmptyOptionText);
        }
        if self.option(&id).is_some() {
            return Err(ReconcileError::DuplicateOption(id.to_string()));
        }

        let mut next = self.clone();
        next.options.push(PollOption {
            id,
            text: text.to_string(),
            vote_count: 0,
        });
        Ok(next)
    }

    // === Queries ===

    /// Options currently selected by a display name.
    pub fn selection_of(&self, name: &DisplayName) -> BTreeSet<OptionId> {
        identities_named(&self.display_name_of, name)
            .iter()
            .filter_map(|id| self.voter_selections.get(id))
            .flat_map(|selection| selection.iter().cloned())
            .collect()
    }

    /// State of a logical voter.
    pub fn voter_state(&self, name: &DisplayName) -> VoterState {
        let selection = self.selection_of(name);
        if selection.is_empty() {
            VoterState::NotVoted
        } else if self.allow_multiple {
            VoterState::VotedMulti(selection)
        } else {
            match selection.into_iter().next() {
                Some(option) => VoterState::VotedSingle(option),
                None => VoterState::NotVoted,
            }
        }
    }

    /// Tally for display. Voter names are withheld on anonymous polls.
    pub fn results(&self) -> PollResults {
        let options = self
            .options
            .iter()
            .map(|option| {
                let percentage = if self.total_votes == 0 {
                    0.0
                } else {
                    f64::from(option.vote_count) * 100.0 / f64::from(self.total_votes)
                };
                let voters = (!self.is_anonymous).then(|| {
                    let mut names: Vec<DisplayName> = self
                        .voter_selections
                        .iter()
                        .filter(|(_, selection)| selection.contains(&option.id))
                        .filter_map(|(id, _)| self.display_name_of.get(id).cloned())
                        .collect();
                    names.sort();
                    names
                });
                OptionResult {
                    id: option.id.clone(),
                    text: option.text.clone(),
                    votes: option.vote_count,
                    percentage,
                    voters,
                }
            })
            .collect();

        PollResults {
            question: self.question.clone(),
            total_votes: self.total_votes,
            voter_count: self.voters.len(),
            options,
        }
    }
}

impl Reducer for Poll {
    type Action = PollAction;

    fn reduce(&self, action: &Self::Action) -> Result<Self> {
        match action {
            PollAction::Toggle {
                identity,
                name,
                option,
            } => self.toggle_option(identity, name, option),
            PollAction::Select {
                identity,
                name,
                option,
            } => self.select_option(identity, name, option),
            PollAction::Vote {
                identity,
                name,
                option,
            } => self.vote(identity, name, option),
            PollAction::AddOption { option, text } => self.add_option_with_id(option.clone(), text),
        }
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        let known: BTreeSet<&OptionId> = self.options.iter().map(|o| &o.id).collect();
        for (identity, selection) in &self.voter_selections {
            if let Some(unknown) = selection.iter().find(|o| !known.contains(o)) {
                return Err(InvariantViolation::UnknownOption(unknown.to_string()));
            }
            if !self.allow_multiple && selection.len() > 1 {
                return Err(InvariantViolation::MultipleSelections(identity.to_string()));
            }
        }

        for option in &self.options {
            let derived = self
                .voter_selections
                .values()
                .filter(|selection| selection.contains(&option.id))
                .count() as u32;
            if derived != option.vote_count {
                return Err(InvariantViolation::OptionCountMismatch {
                    option: option.id.to_string(),
                    stored: option.vote_count,
                    derived,
                });
            }
        }

        let counted: u32 = self.options.iter().map(|o| o.vote_count).sum();
        let selected: u32 = self.voter_selections.values().map(|s| s.len() as u32).sum();
        if self.total_votes != counted || counted != selected {
            return Err(InvariantViolation::TallyMismatch {
                total: self.total_votes,
                counted,
                selected,
            });
        }

        let with_votes: BTreeSet<&ConnectionId> = self
            .voter_selections
            .iter()
            .filter(|(_, selection)| !selection.is_empty())
            .map(|(id, _)| id)
            .collect();
        let recorded: BTreeSet<&ConnectionId> = self.voters.iter().collect();
        if with_votes != recorded {
            return Err(InvariantViolation::VoterSetMismatch);
        }

        let mut names: BTreeSet<&DisplayName> = BTreeSet::new();
        for (identity, name) in &self.display_name_of {
            if !self.voters.contains(identity) {
                return Err(InvariantViolation::OrphanName(identity.to_string()));
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

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    fn name(s: &str) -> DisplayName {
        DisplayName::new(s)
    }

    fn opt(s: &str) -> OptionId {
        OptionId::new(s)
    }

    fn poll() -> Poll {
        Poll::new(
            "p1",
            "Where to eat?",
            vec![PollOption::new("o1", "A"), PollOption::new("o2", "B")],
        )
    }

    fn count(poll: &Poll, option: &str) -> u32 {
        poll.option(&opt(option)).map(|o| o.vote_count).unwrap_or(0)
    }

    #[test]
    fn test_single_select_scenario() {
        let first = poll().select_option(&id("u1"), &name("Kim"), &opt("o1")).unwrap();
        assert_eq!(count(&first, "o1"), 1);
        assert_eq!(first.total_votes, 1);

        let moved = first.select_option(&id("u1"), &name("Kim"), &opt("o2")).unwrap();
        assert_eq!(count(&moved, "o1"), 0);
        assert_eq!(count(&moved, "o2"), 1);
        assert_eq!(moved.total_votes, 1);

        let withdrawn = moved.select_option(&id("u1"), &name("Kim"), &opt("o2")).unwrap();
        assert_eq!(count(&withdrawn, "o2"), 0);
        assert_eq!(withdrawn.total_votes, 0);
        assert!(withdrawn.voters.is_empty());
        assert!(withdrawn.voter_selections.is_empty());
        assert!(withdrawn.display_name_of.is_empty());
        assert_eq!(withdrawn.voter_state(&name("Kim")), VoterState::NotVoted);
    }

    #[test]
    fn test_multi_toggle_scenario() {
        let poll = poll().allow_multiple(true);
        let result = poll
            .toggle_option(&id("u1"), &name("Kim"), &opt("o1"))
            .and_then(|p| p.toggle_option(&id("u1"), &name("Kim"), &opt("o2")))
            .and_then(|p| p.toggle_option(&id("u1"), &name("Kim"), &opt("o1")))
            .unwrap();

        assert_eq!(result.selection_of(&name("Kim")), BTreeSet::from([opt("o2")]));
        assert_eq!(result.total_votes, 1);
        assert!(result.is_consistent());
    }

    #[test]
    fn test_multi_reclick_only_touches_that_option() {
        let poll = poll()
            .allow_multiple(true)
            .toggle_option(&id("u1"), &name("Kim"), &opt("o1"))
            .and_then(|p| p.toggle_option(&id("u1"), &name("Kim"), &opt("o2")))
            .unwrap();
        assert_eq!(poll.total_votes, 2);

        let after = poll.toggle_option(&id("u1"), &name("Kim"), &opt("o2")).unwrap();

        assert_eq!(
            after.voter_state(&name("Kim")),
            VoterState::VotedMulti(BTreeSet::from([opt("o1")]))
        );
        assert_eq!(after.total_votes, 1);
    }

    #[test]
    fn test_single_reclick_withdraws_whole_vote() {
        let poll = poll().select_option(&id("u1"), &name("Kim"), &opt("o1")).unwrap();
        let after = poll.select_option(&id("u1"), &name("Kim"), &opt("o1")).unwrap();

        assert_eq!(after.voter_state(&name("Kim")), VoterState::NotVoted);
    }

    #[test]
    fn test_second_device_transfers_single_vote() {
        let phone = poll().select_option(&id("A"), &name("Kim"), &opt("o1")).unwrap();
        let pc = phone.select_option(&id("B"), &name("Kim"), &opt("o2")).unwrap();

        assert!(!pc.voters.contains(&id("A")));
        assert!(pc.voters.contains(&id("B")));
        assert_eq!(count(&pc, "o1"), 0);
        assert_eq!(count(&pc, "o2"), 1);
        assert_eq!(pc.total_votes, 1);
        assert!(pc.is_consistent());
    }

    #[test]
    fn test_second_device_reclick_withdraws() {
        let phone = poll().select_option(&id("A"), &name("Kim"), &opt("o1")).unwrap();
        let pc = phone.select_option(&id("B"), &name("Kim"), &opt("o1")).unwrap();

        assert_eq!(pc.total_votes, 0);
        assert!(pc.voters.is_empty());
    }

    #[test]
    fn test_second_device_starts_from_own_multi_selection() {
        let phone = poll()
            .allow_multiple(true)
            .toggle_option(&id("A"), &name("Kim"), &opt("o1"))
            .unwrap();
        let pc = phone.toggle_option(&id("B"), &name("Kim"), &opt("o2")).unwrap();

        assert_eq!(pc.voters, BTreeSet::from([id("B")]));
        assert_eq!(pc.selection_of(&name("Kim")), BTreeSet::from([opt("o2")]));
        assert_eq!(count(&pc, "o1"), 0);
        assert_eq!(pc.total_votes, 1);
        assert!(pc.is_consistent());
    }

    #[test]
    fn test_rename_then_same_option_records_vote() {
        let kim = poll().select_option(&id("u1"), &name("Kim"), &opt("o1")).unwrap();
        let lee = kim.select_option(&id("u1"), &name("Lee"), &opt("o1")).unwrap();

        assert_eq!(lee.voter_state(&name("Lee")), VoterState::VotedSingle(opt("o1")));
        assert_eq!(lee.voter_state(&name("Kim")), VoterState::NotVoted);
        assert_eq!(count(&lee, "o1"), 1);
        assert_eq!(lee.total_votes, 1);
        assert!(lee.is_consistent());
    }

    #[test]
    fn test_rename_transfers_votes() {
        let before = poll()
            .allow_multiple(true)
            .toggle_option(&id("u1"), &name("Kim"), &opt("o1"))
            .unwrap();
        let after = before.toggle_option(&id("u1"), &name("Kimmy"), &opt("o2")).unwrap();

        assert_eq!(after.selection_of(&name("Kim")), BTreeSet::new());
        assert_eq!(after.selection_of(&name("Kimmy")).len(), 2);
        assert_eq!(after.total_votes, 2);
    }

    #[test]
    fn test_different_names_coexist() {
        let poll = poll()
            .select_option(&id("u1"), &name("Kim"), &opt("o1"))
            .and_then(|p| p.select_option(&id("u2"), &name("Lee"), &opt("o1")))
            .unwrap();

        assert_eq!(count(&poll, "o1"), 2);
        assert_eq!(poll.voters.len(), 2);
    }

    #[test]
    fn test_unknown_option_is_rejected_without_change() {
        let poll = poll();
        let result = poll.select_option(&id("u1"), &name("Kim"), &opt("nope"));

        assert_eq!(result, Err(ReconcileError::InvalidTarget("nope".to_string())));
        assert_eq!(poll.total_votes, 0);
    }

    #[test]
    fn test_wrong_mode_is_rejected() {
        let single = poll();
        assert!(matches!(
            single.toggle_option(&id("u1"), &name("Kim"), &opt("o1")),
            Err(ReconcileError::ModeMismatch { .. })
        ));

        let multi = poll().allow_multiple(true);
        assert!(matches!(
            multi.select_option(&id("u1"), &name("Kim"), &opt("o1")),
            Err(ReconcileError::ModeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_name_is_refused() {
        let result = poll().vote(&id("u1"), &name(""), &opt("o1"));
        assert!(matches!(result, Err(ReconcileError::MissingIdentityContext(_))));
    }

    #[test]
    fn test_add_option() {
        let poll = poll()
            .allow_add_options(true)
            .select_option(&id("u1"), &name("Kim"), &opt("o1"))
            .unwrap();

        let grown = poll.add_option("  Noodles ").unwrap();

        assert_eq!(grown.options.len(), 3);
        assert_eq!(grown.options[2].text, "Noodles");
        assert_eq!(grown.options[2].vote_count, 0);
        assert_eq!(count(&grown, "o1"), 1);
        assert_eq!(grown.total_votes, 1);

        let voted = grown
            .select_option(&id("u2"), &name("Lee"), &grown.options[2].id.clone())
            .unwrap();
        assert_eq!(voted.total_votes, 2);
    }

    #[test]
    fn test_add_option_refusals() {
        assert_eq!(
            poll().add_option("C"),
            Err(ReconcileError::OptionsLocked("p1".to_string()))
        );

        let open = poll().allow_add_options(true);
        assert_eq!(open.add_option("   "), Err(ReconcileError::EmptyOptionText));
        assert!(matches!(
            open.add_option_with_id(opt("o1"), "again"),
            Err(ReconcileError::DuplicateOption(_))
        ));
    }

    #[test]
    fn test_is_closed_on() {
        let end = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let closing = poll().closes_on(end);

        assert!(!closing.is_closed_on(end));
        assert!(closing.is_closed_on(end.succ_opt().unwrap()));
        assert!(!poll().is_closed_on(end.succ_opt().unwrap()));
    }

    #[test]
    fn test_results_hide_names_when_anonymous() {
        let public = poll().select_option(&id("u1"), &name("Kim"), &opt("o1")).unwrap();
        let results = public.results();
        assert_eq!(results.options[0].voters, Some(vec![name("Kim")]));
        assert_eq!(results.options[0].percentage, 100.0);
        assert_eq!(results.leaders().len(), 1);

        let secret = poll()
            .anonymous(true)
            .select_option(&id("u1"), &name("Kim"), &opt("o1"))
            .unwrap();
        let results = secret.results();
        assert_eq!(results.options[0].voters, None);
        assert_eq!(results.options[0].votes, 1);
    }

    #[test]
    fn test_recount_heals_drifted_counters() {
        let mut poll = poll()
            .allow_multiple(true)
            .toggle_option(&id("u1"), &name("Kim"), &opt("o1"))
            .unwrap();
        poll.options[0].vote_count = 7;
        poll.total_votes = 9;
        poll.voters.insert(id("ghost"));
        poll.voter_selections
            .insert(id("u2"), BTreeSet::from([opt("missing")]));
        assert!(!poll.is_consistent());

        poll.recount();

        assert!(poll.is_consistent());
        assert_eq!(poll.total_votes, 1);
        assert_eq!(poll.voters, BTreeSet::from([id("u1")]));
    }

    #[test]
    fn test_recount_collapses_stale_duplicates() {
        let mut poll = poll();
        poll.voter_selections.insert(id("a"), BTreeSet::from([opt("o1")]));
        poll.voter_selections.insert(id("b"), BTreeSet::from([opt("o2")]));
        poll.display_name_of.insert(id("a"), name("Kim"));
        poll.display_name_of.insert(id("b"), name("Kim"));

        poll.recount();

        assert!(poll.is_consistent());
        assert_eq!(poll.voters, BTreeSet::from([id("a")]));
        assert_eq!(poll.total_votes, 1);
    }

    #[test]
    fn test_reducer_actions() {
        let actions = vec![
            PollAction::AddOption {
                option: opt("o3"),
                text: "C".to_string(),
            },
            PollAction::Vote {
                identity: id("u1"),
                name: name("Kim"),
                option: opt("o3"),
            },
        ];

        let result = poll().allow_add_options(true).replay(&actions).unwrap();

        assert_eq!(count(&result, "o3"), 1);
        assert_eq!(result, poll().allow_add_options(true).replay(&actions).unwrap());
    }

    #[test]
    fn test_serde_shape() {
        let poll = poll().select_option(&id("u1"), &name("Kim"), &opt("o1")).unwrap();
        let json = serde_json::to_value(&poll).unwrap();

        assert_eq!(json["totalVotes"], 1);
        assert_eq!(json["options"][0]["optionId"], "o1");
        assert_eq!(json["options"][0]["voteCount"], 1);
        assert_eq!(json["voterSelections"]["u1"][0], "o1");
        assert_eq!(json["displayNameOf"]["u1"], "Kim");

        let back: Poll = serde_json::from_value(json).unwrap();
        assert_eq!(back, poll);
    }
}
