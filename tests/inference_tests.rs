//! End-to-end turn tests over the in-memory store.

use chrono::{DateTime, TimeZone, Utc};
use ruleflow::config::EngineConfig;
use ruleflow::engine::{EntityCatalog, StaticDirectory};
use ruleflow::rules::{
    EntityKind, Operation, ParamValue, Rule, RuleSet, RuleSetCache, StaticRuleSource,
    WeightCondition,
};
use ruleflow::store::{BatchedStateStore, MemoryBackend};
use ruleflow::{EngineError, InferenceEngine, StateStore, TurnInput};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn rule_sets() -> Vec<RuleSet> {
    vec![
        RuleSet::new("Main")
            .with_trigger("1800100200")
            .with_rule(
                Rule::new("Greeting", "Message")
                    .with_threshold(10.0)
                    .with_condition(
                        WeightCondition::new("Customer", Operation::IsNotNull, 10.0),
                    )
                    .with_param("message", ParamValue::classify("Hi {{Customer.FirstName}}")),
            )
            .with_rule(
                Rule::new("AnonymousGreeting", "Message")
                    .with_threshold(10.0)
                    .with_condition(WeightCondition::new("Customer", Operation::IsNull, 10.0))
                    .with_param("message", ParamValue::text("Hello there")),
            )
            .with_rule(
                Rule::new("Menu", "Menu")
                    .with_param("queueName", ParamValue::text("Sales")),
            ),
        RuleSet::new("Billing")
            .with_trigger("1800300400")
            .with_rule(Rule::new("Balance", "Message").with_param("message", ParamValue::text("Balance"))),
    ]
}

fn catalog() -> EntityCatalog {
    EntityCatalog::new()
        .with(EntityKind::Flow, "RulesEngineMessage", "f-1", "arn:flow/message")
        .with(EntityKind::Flow, "RulesEngineMenu", "f-2", "arn:flow/menu")
        .with(EntityKind::Queue, "Sales", "q-1", "arn:queue/sales")
}

fn directory() -> StaticDirectory {
    StaticDirectory::from_json(
        r#"[
            {"AccountNumber": "A1", "AccountName": "Jane Citizen", "PhoneNumber1": "0412000111",
             "PostCode": "2000", "DateOfBirth": "01/02/1980"}
        ]"#,
    )
    .unwrap()
}

fn engine_with(rule_sets: Vec<RuleSet>, catalog: EntityCatalog) -> InferenceEngine {
    InferenceEngine::new(
        &EngineConfig::default(),
        Arc::new(BatchedStateStore::with_limits(MemoryBackend::new(), 86_400, 25)),
        Arc::new(StaticRuleSource::new(rule_sets)),
        Arc::new(RuleSetCache::default()),
        Arc::new(catalog),
        Arc::new(directory()),
    )
}

fn engine() -> InferenceEngine {
    engine_with(rule_sets(), catalog())
}

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 8, 15, 0).unwrap()
}

#[tokio::test]
async fn test_known_caller_is_greeted_by_name() {
    let engine = engine();
    let input = TurnInput::new("c-1")
        .with_trigger("1800100200")
        .with_caller("+61412000111");

    let outcome = engine.infer_at(&input, morning()).await.unwrap();
    assert_eq!(outcome.rule_set, "Main");
    assert_eq!(outcome.rule, "Greeting");
    assert_eq!(outcome.action_type, "Message");
    assert_eq!(outcome.attributes["CurrentRule_message"], "Hi Jane");
    assert_eq!(outcome.attributes["CurrentRule_nextFlowArn"], "arn:flow/message");
    assert_eq!(outcome.attributes["CustomerPhoneNumber"], "+61412000111");
    assert_eq!(outcome.attributes["OriginalCustomerNumber"], "+61412000111");
}

#[tokio::test]
async fn test_unknown_caller_falls_through() {
    let engine = engine();
    let input = TurnInput::new("c-2")
        .with_trigger("1800100200")
        .with_caller("+61499999999");

    let outcome = engine.infer_at(&input, morning()).await.unwrap();
    assert_eq!(outcome.rule, "AnonymousGreeting");
    assert_eq!(outcome.attributes["AccountDisambiguate"], "PhoneNumber");
    assert_eq!(outcome.attributes["CustomerPhoneNumber"], "anonymous");
}

#[tokio::test]
async fn test_system_attributes_written_once() {
    let engine = engine();
    let input = TurnInput::new("c-3").with_trigger("1800100200");

    engine.infer_at(&input, morning()).await.unwrap();
    let state = engine.store().load("c-3").await.unwrap();
    assert_eq!(state.lookup("System.DialledNumber"), Some(json!("1800100200")));
    assert_eq!(state.lookup("System.TimeOfDay"), Some(json!("morning")));
    assert_eq!(
        state.lookup("System.DateTimeUTC"),
        Some(json!("2024-06-03T08:15:00Z"))
    );

    // A later turn with a different trigger keeps the original system block
    let later = Utc.with_ymd_and_hms(2024, 6, 3, 20, 0, 0).unwrap();
    engine
        .infer_at(&TurnInput::new("c-3").with_trigger("1800300400"), later)
        .await
        .unwrap();
    let state = engine.store().load("c-3").await.unwrap();
    assert_eq!(state.lookup("System.DialledNumber"), Some(json!("1800100200")));
}

#[tokio::test]
async fn test_turns_walk_the_rule_list_then_exhaust() {
    let engine = engine();
    let input = TurnInput::new("c-4")
        .with_trigger("1800100200")
        .with_caller("+61412000111");

    let first = engine.infer_at(&input, morning()).await.unwrap();
    assert_eq!(first.rule, "Greeting");

    // AnonymousGreeting no longer activates once Customer is bound
    let second = engine.infer_at(&input, morning()).await.unwrap();
    assert_eq!(second.rule, "Menu");
    assert_eq!(second.attributes["CurrentRule_queueArn"], "arn:queue/sales");
    assert_eq!(second.attributes["CurrentRule_queueId"], "q-1");
    assert!(!second.attributes.contains_key("CurrentRule_message"));

    let err = engine.infer_at(&input, morning()).await.unwrap_err();
    assert!(matches!(err, EngineError::Exhausted { ref rule, .. } if rule == "Menu"));
}

#[tokio::test]
async fn test_next_rule_set_directive() {
    let engine = engine();
    let input = TurnInput::new("c-5").with_trigger("1800100200");
    engine.infer_at(&input, morning()).await.unwrap();

    let mut params = BTreeMap::new();
    params.insert("key1".to_string(), "NextRuleSet".to_string());
    params.insert("value1".to_string(), "Billing".to_string());
    engine.set_state("c-5", &params).await.unwrap();

    let outcome = engine.infer_at(&input, morning()).await.unwrap();
    assert_eq!(outcome.rule_set, "Billing");
    assert_eq!(outcome.rule, "Balance");
    assert_eq!(outcome.attributes["CurrentRuleSet"], "Billing");
    assert!(!outcome.attributes.contains_key("NextRuleSet"));
}

#[tokio::test]
async fn test_unknown_trigger_fails_turn() {
    let engine = engine();
    let err = engine
        .infer_at(&TurnInput::new("c-6").with_trigger("999"), morning())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RuleSetNotFound(_)));

    // Nothing persisted for a failed turn
    assert!(engine.load_state("c-6").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_flow_is_lookup_failure() {
    let catalog = EntityCatalog::new().with(EntityKind::Queue, "Sales", "q-1", "arn:queue/sales");
    let engine = engine_with(rule_sets(), catalog);

    let err = engine
        .infer_at(&TurnInput::new("c-7").with_trigger("1800100200"), morning())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LookupFailed { ref kind, .. } if kind == "flow"));
}

#[tokio::test]
async fn test_no_rule_activates() {
    let rule_sets = vec![RuleSet::new("Strict").with_trigger("1").with_rule(
        Rule::new("Never", "Message")
            .with_threshold(1.0)
            .with_condition(WeightCondition::new("Missing", Operation::IsNotNull, 1.0)),
    )];
    let engine = engine_with(rule_sets, catalog());

    let err = engine
        .infer_at(&TurnInput::new("c-8").with_trigger("1"), morning())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoRuleActivated(ref name) if name == "Strict"));
}
