//! Customer disambiguation.
//!
//! Narrows the accounts registered against the caller's address down to a
//! single `Customer`, asking at most one discriminating question (post code
//! or date of birth) or one alternate address along the way.
//!
//! ```text
//! Customer present / NoAccounts ─────────────► done
//! no address ────────────────────────────────► ask PhoneNumber
//! answered PostCode | DateOfBirth ───────────► match or NoAccounts
//! load candidates
//!   ├── 0 after alternate address ───────────► NoAccounts
//!   ├── 1 ───────────────────────────────────► Customer
//!   ├── 0 ───────────────────────────────────► ask PhoneNumber
//!   └── n ───────────────────────────────────► ask PostCode | DateOfBirth | NoAccounts
//! ```

use crate::error::{EngineError, EngineResult};
use crate::state::{keys, scalar_text, TrackedState};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Caller address value meaning "withheld, ask for another"
pub const ANONYMOUS: &str = "anonymous";

const PHONE_NUMBER: &str = "PhoneNumber";
const POST_CODE: &str = "PostCode";
const DATE_OF_BIRTH: &str = "DateOfBirth";
const DATE_OF_BIRTH_SIMPLE: &str = "DateOfBirthSimple";
const ACCOUNT_NUMBER: &str = "AccountNumber";

/// Source of candidate customer records for an address
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn find_candidates(&self, address: &str) -> EngineResult<Vec<Value>>;
}

/// `+61…` becomes `0…`; anything else is used as given
pub fn normalize_address(address: &str) -> String {
    match address.strip_prefix("+61") {
        Some(rest) => format!("0{rest}"),
        None => address.to_string(),
    }
}

/// Derive `DateOfBirthSimple`, `FirstName` and `LastName` on a raw record
pub fn make_account_item(mut record: Map<String, Value>) -> Map<String, Value> {
    let simple = record
        .get(DATE_OF_BIRTH)
        .and_then(Value::as_str)
        .map(|dob| dob.replace('/', ""))
        .unwrap_or_default();
    record.insert(DATE_OF_BIRTH_SIMPLE.to_string(), Value::String(simple));

    let (first, last) = match record.get("AccountName").and_then(Value::as_str) {
        Some(name) => match name.split_once(' ') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => (name.to_string(), String::new()),
        },
        None => (String::new(), String::new()),
    };
    record.insert("FirstName".to_string(), Value::String(first));
    record.insert("LastName".to_string(), Value::String(last));
    record
}

/// Account records held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    accounts: Vec<Map<String, Value>>,
}

impl StaticDirectory {
    pub fn new(accounts: Vec<Map<String, Value>>) -> Self {
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Parse a JSON array of account records
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let accounts: Vec<Map<String, Value>> = serde_json::from_str(text)
            .map_err(|e| EngineError::Directory(format!("invalid account directory: {e}")))?;
        Ok(Self::new(accounts))
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Directory(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    fn matching<'a>(
        &'a self,
        field: &'a str,
        address: &'a str,
    ) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
        self.accounts
            .iter()
            .filter(move |a| a.get(field).and_then(Value::as_str) == Some(address))
    }
}

#[async_trait]
impl EntityDirectory for StaticDirectory {
    async fn find_candidates(&self, address: &str) -> EngineResult<Vec<Value>> {
        let address = normalize_address(address);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        let hits = self
            .matching("PhoneNumber1", &address)
            .chain(self.matching("PhoneNumber2", &address));
        for record in hits {
            let item = make_account_item(record.clone());
            let number = item.get(ACCOUNT_NUMBER).and_then(scalar_text);
            if seen.insert(number) {
                candidates.push(Value::Object(item));
            }
        }

        Ok(candidates)
    }
}

/// Where a disambiguation pass left the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisambiguationOutcome {
    /// Customer already bound or previously given up on
    Skipped,
    /// Exactly one account bound to `Customer`
    Resolved,
    /// Caller must supply the field named in `AccountDisambiguate`
    NeedsInput,
    /// `NoAccounts` set
    NoAccounts,
}

/// Runs the disambiguation workflow against a session
#[derive(Clone)]
pub struct Disambiguator {
    directory: Arc<dyn EntityDirectory>,
}

impl Disambiguator {
    pub fn new(directory: Arc<dyn EntityDirectory>) -> Self {
        Self { directory }
    }

    pub async fn run(&self, state: &mut TrackedState) -> EngineResult<DisambiguationOutcome> {
        if state.contains(keys::CUSTOMER) {
            tracing::debug!("customer_already_resolved");
            return Ok(DisambiguationOutcome::Skipped);
        }
        if state.get_str(keys::NO_ACCOUNTS) == Some("true") {
            tracing::debug!("customer_previously_unresolvable");
            return Ok(DisambiguationOutcome::Skipped);
        }

        let address = state
            .get_str(keys::CUSTOMER_PHONE)
            .filter(|a| *a != ANONYMOUS)
            .map(str::to_string);
        let Some(address) = address else {
            tracing::info!("customer_address_requested");
            state.set(keys::ACCOUNT_DISAMBIGUATE, PHONE_NUMBER);
            return Ok(DisambiguationOutcome::NeedsInput);
        };

        let asked = state.get_str(keys::ACCOUNT_DISAMBIGUATE).map(str::to_string);
        for (question, answer_key, account_field) in [
            (POST_CODE, POST_CODE, POST_CODE),
            (DATE_OF_BIRTH, DATE_OF_BIRTH, DATE_OF_BIRTH_SIMPLE),
        ] {
            if asked.as_deref() != Some(question) {
                continue;
            }
            let Some(answer) = state.get(answer_key).and_then(scalar_text) else {
                continue;
            };
            return Ok(Self::match_answer(state, account_field, &answer));
        }

        if !state.contains(keys::ACCOUNTS) || asked.as_deref() == Some(PHONE_NUMBER) {
            let candidates = self.directory.find_candidates(&address).await?;
            tracing::info!(address = %address, candidates = candidates.len(), "customer_accounts_loaded");
            state.set(keys::ACCOUNTS, Value::Array(candidates));
        }

        let accounts = accounts(state);
        if accounts.is_empty() && asked.as_deref() == Some(PHONE_NUMBER) {
            tracing::info!(address = %address, "customer_alternate_address_unmatched");
            state.set(keys::NO_ACCOUNTS, "true");
            return Ok(DisambiguationOutcome::NoAccounts);
        }

        clear_customer_flags(state);

        match accounts.len() {
            1 => {
                let account = accounts.into_iter().next().unwrap_or(Value::Null);
                tracing::info!(account = ?account.get(ACCOUNT_NUMBER), "customer_resolved");
                state.set(keys::CUSTOMER, account);
                Ok(DisambiguationOutcome::Resolved)
            }
            0 => {
                tracing::info!(address = %address, "customer_alternate_address_requested");
                state.set(keys::ACCOUNT_DISAMBIGUATE, PHONE_NUMBER);
                state.set(keys::CUSTOMER_PHONE, ANONYMOUS);
                Ok(DisambiguationOutcome::NeedsInput)
            }
            n => {
                if distinct_count(&accounts, POST_CODE) == n {
                    tracing::info!(accounts = n, "customer_disambiguate_by_post_code");
                    state.set(keys::ACCOUNT_DISAMBIGUATE, POST_CODE);
                    Ok(DisambiguationOutcome::NeedsInput)
                } else if distinct_count(&accounts, DATE_OF_BIRTH) == n {
                    tracing::info!(accounts = n, "customer_disambiguate_by_date_of_birth");
                    state.set(keys::ACCOUNT_DISAMBIGUATE, DATE_OF_BIRTH);
                    Ok(DisambiguationOutcome::NeedsInput)
                } else {
                    tracing::info!(accounts = n, address = %address, "customer_accounts_inseparable");
                    state.set(keys::NO_ACCOUNTS, "true");
                    Ok(DisambiguationOutcome::NoAccounts)
                }
            }
        }
    }

    fn match_answer(state: &mut TrackedState, field: &str, answer: &str) -> DisambiguationOutcome {
        let found = accounts(state)
            .into_iter()
            .find(|a| a.get(field).and_then(scalar_text).as_deref() == Some(answer));

        clear_customer_flags(state);
        match found {
            Some(account) => {
                tracing::info!(field, account = ?account.get(ACCOUNT_NUMBER), "customer_resolved");
                state.set(keys::CUSTOMER, account);
                DisambiguationOutcome::Resolved
            }
            None => {
                tracing::info!(field, "customer_answer_unmatched");
                state.set(keys::NO_ACCOUNTS, "true");
                DisambiguationOutcome::NoAccounts
            }
        }
    }
}

fn accounts(state: &TrackedState) -> Vec<Value> {
    match state.get(keys::ACCOUNTS) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn clear_customer_flags(state: &mut TrackedState) {
    state.clear(keys::NO_ACCOUNTS);
    state.clear(keys::ACCOUNT_DISAMBIGUATE);
}

/// Distinct values of a field, counting a missing field once
fn distinct_count(accounts: &[Value], field: &str) -> usize {
    accounts
        .iter()
        .map(|a| a.get(field).and_then(scalar_text))
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("+61412345678"), "0412345678");
        assert_eq!(normalize_address("0412345678"), "0412345678");
        assert_eq!(normalize_address("+1555"), "+1555");
    }

    #[test]
    fn test_make_account_item() {
        let item = make_account_item(record(json!({
            "AccountNumber": "A1",
            "AccountName": "Ann Marie Smith",
            "DateOfBirth": "01/02/1980"
        })));
        assert_eq!(item["DateOfBirthSimple"], "01021980");
        assert_eq!(item["FirstName"], "Ann");
        assert_eq!(item["LastName"], "Marie Smith");

        let single = make_account_item(record(json!({"AccountName": "Cher"})));
        assert_eq!(single["FirstName"], "Cher");
        assert_eq!(single["LastName"], "");
        assert_eq!(single["DateOfBirthSimple"], "");
    }

    #[tokio::test]
    async fn test_directory_matches_both_numbers_once() {
        let directory = StaticDirectory::new(vec![
            record(json!({"AccountNumber": "A1", "PhoneNumber1": "0400", "PhoneNumber2": "0400"})),
            record(json!({"AccountNumber": "A2", "PhoneNumber2": "0400"})),
            record(json!({"AccountNumber": "A3", "PhoneNumber1": "0500"})),
        ]);

        let found = directory.find_candidates("+61400").await.unwrap();
        let numbers: Vec<_> = found.iter().map(|a| a["AccountNumber"].clone()).collect();
        assert_eq!(numbers, vec![json!("A1"), json!("A2")]);
    }

    #[test]
    fn test_distinct_count() {
        let accounts = vec![
            json!({"PostCode": "2000"}),
            json!({"PostCode": "2000"}),
            json!({}),
        ];
        assert_eq!(distinct_count(&accounts, "PostCode"), 2);
    }
}
