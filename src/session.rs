//! Per-user editing context
//!
//! Holds what a user is building between requests: the in-progress
//! selection, whether a new list is being created or an existing one
//! updated, and the name of the list being edited.

use crate::db::LocalStore;
use crate::error::{Error, Result, ValidationWarning};
use crate::reference::ReferenceStore;
use crate::selection::Selection;
use crate::types::{BetListDetail, OddDetail, UpsertOutcome};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Whether a save creates a new list or replaces an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    Create,
    Update,
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditMode::Create => write!(f, "create"),
            EditMode::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub selection: Selection,
    pub mode: EditMode,
    /// Set in update mode
    pub editing: Option<String>,
    /// Odds of the list as saved, for comparing against the new selection
    pub previous_odds: Vec<OddDetail>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            selection: Selection::new(),
            mode: EditMode::Create,
            editing: None,
            previous_odds: Vec::new(),
        }
    }

    /// Start over on a new bet list
    pub fn begin_create(&mut self) {
        *self = Self::new();
    }

    /// Edit a saved bet list. Its matches and choices are preloaded.
    pub fn begin_update(&mut self, detail: BetListDetail) {
        info!("Editing bet list '{}'", detail.bet_list.bet_list_name);
        self.selection = Selection::from_odds(detail.odds.iter().cloned());
        self.mode = EditMode::Update;
        self.editing = Some(detail.bet_list.bet_list_name);
        self.previous_odds = detail.odds;
    }

    /// Name the list will be saved under: the edited list in update mode,
    /// otherwise the given one
    pub fn target_name<'a>(&'a self, requested: &'a str) -> &'a str {
        match (&self.mode, &self.editing) {
            (EditMode::Update, Some(name)) => name.as_str(),
            _ => requested.trim(),
        }
    }

    /// Early warning about a name before anything is saved
    pub fn check_name(&self, name: &str, existing: &[String]) -> Option<Error> {
        let name = self.target_name(name);
        if name.is_empty() {
            return Some(ValidationWarning::MissingName.into());
        }
        if self.mode == EditMode::Create && existing.iter().any(|e| e == name) {
            return Some(Error::DuplicateName(name.to_string()));
        }
        None
    }

    /// Validate and persist the selection, then start a fresh session.
    ///
    /// Creating over an existing name is refused; update mode always
    /// replaces the edited list.
    pub async fn save(
        &mut self,
        name: &str,
        local: &LocalStore,
        reference: &ReferenceStore,
    ) -> Result<UpsertOutcome> {
        let name = self.target_name(name).to_string();
        let odds = self.selection.to_bet_list_odds()?;

        if let Some(err) = self.check_name(&name, &local.bet_list_names().await?) {
            return Err(err);
        }

        let keys: Vec<String> = odds.iter().map(|o| o.key.clone()).collect();
        let missing = reference.missing_keys(&keys).await?;
        if !missing.is_empty() {
            return Err(Error::odds_not_found(&missing));
        }

        let outcome = local.upsert_bet_list(&name, &odds).await?;
        self.begin_create();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{odd_key, ReferenceFixture};

    async fn choose(session: &mut Session, reference: &ReferenceStore, match_code: i64, label: &str) {
        let odd = reference.odd_detail(&odd_key(match_code, label)).await.unwrap();
        session.selection.enter_match(match_code);
        session.selection.choose_odd(match_code, odd).unwrap();
    }

    #[tokio::test]
    async fn test_create_then_duplicate_name_is_refused() {
        let fixture = ReferenceFixture::standard().await;
        let reference = fixture.open().await;
        let local = fixture.local_store().await;

        let mut session = Session::new();
        choose(&mut session, &reference, 3, "1").await;
        choose(&mut session, &reference, 4, "X2").await;
        let outcome = session.save("sunday", &local, &reference).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert!(session.selection.is_empty());

        let names = local.bet_list_names().await.unwrap();
        assert!(matches!(session.check_name("sunday", &names), Some(Error::DuplicateName(_))));

        choose(&mut session, &reference, 3, "X").await;
        let duplicate = session.save("sunday", &local, &reference).await;
        assert!(matches!(duplicate, Err(Error::DuplicateName(_))));
        // Refused saves keep the selection
        assert_eq!(session.selection.len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_edited_list() {
        let fixture = ReferenceFixture::standard().await;
        let reference = fixture.open().await;
        let local = fixture.local_store().await;

        let first = reference
            .odd_details(&[odd_key(3, "1"), odd_key(4, "1")])
            .await
            .unwrap();
        local.upsert_bet_list("evening", &first).await.unwrap();

        let mut session = Session::new();
        let detail = BetListDetail {
            bet_list: local.bet_list("evening").await.unwrap(),
            odds: first.clone(),
        };
        session.begin_update(detail);
        assert_eq!(session.mode, EditMode::Update);
        assert!(session.selection.is_valid());
        assert_eq!(session.selection.len(), 2);

        session.selection.remove_match(4);
        choose(&mut session, &reference, 3, "+ 1.5 go.").await;

        let outcome = session.save("ignored", &local, &reference).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(session.mode, EditMode::Create);

        let saved = local.bet_list("evening").await.unwrap();
        assert_eq!(saved.odds, vec![odd_key(3, "+ 1.5 go.")]);
        assert!(local.find_bet_list("ignored").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_blocks_on_missing_choice_and_blank_name() {
        let fixture = ReferenceFixture::standard().await;
        let reference = fixture.open().await;
        let local = fixture.local_store().await;

        let mut session = Session::new();
        choose(&mut session, &reference, 3, "1").await;
        session.selection.enter_match(4);

        let missing = session.save("x", &local, &reference).await;
        assert!(matches!(
            missing,
            Err(Error::Validation(ValidationWarning::MissingChoice { .. }))
        ));

        session.selection.remove_match(4);
        let blank = session.save("  ", &local, &reference).await;
        assert!(matches!(blank, Err(Error::Validation(ValidationWarning::MissingName))));
        assert!(local.bet_lists().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_rejects_odds_absent_from_reference() {
        let fixture = ReferenceFixture::standard().await;
        let reference = fixture.open().await;
        let local = fixture.local_store().await;

        let mut odd = reference.odd_detail(&odd_key(3, "1")).await.unwrap();
        odd.key = "withdrawn".to_string();

        let mut session = Session::new();
        session.selection.enter_match(3);
        session.selection.choose_odd(3, odd).unwrap();

        let result = session.save("ghost", &local, &reference).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
