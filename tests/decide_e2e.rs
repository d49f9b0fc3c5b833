use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use survey_targeting::{
    AccountId, CapScope, DeviceDataMatcher, DeviceHistory, DeviceHistoryStore, DeviceId, DeviceTargeting,
    DeviceType, DeviceValue, EngineConfig, FrequencyCapConfig, GeoLocation, ImpressionLog, InMemoryStores,
    Interval, Schedule, StorageError, Survey, SurveyId, SurveyStatus, TargetingEngine, Trigger, TriggerRecord,
    VisitorContext,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn live_survey(id: u64) -> Survey {
    Survey::new(SurveyId::new(id), AccountId::new(1), format!("survey-{id}"))
        .with_status(SurveyStatus::Live)
        .with_goal(100)
}

fn engine_with(survey: Survey, triggers: Vec<Trigger>) -> (TargetingEngine, Arc<InMemoryStores>) {
    let stores = Arc::new(InMemoryStores::new());
    let id = survey.id;
    stores.insert_survey(survey).unwrap();
    for trigger in triggers {
        stores.add_trigger(id, trigger).unwrap();
    }
    let engine = TargetingEngine::in_memory(Arc::clone(&stores), EngineConfig::default());
    (engine, stores)
}

fn device_ctx(at: DateTime<Utc>) -> VisitorContext {
    VisitorContext::new()
        .with_url("https://site.com/pricing")
        .with_device_id("udid-1")
        .with_evaluated_at(at)
}

#[test]
fn pricing_trigger_renders_and_suppresser_blocks() {
    let ctx = VisitorContext::new().with_url("https://site.com/pricing?ref=ad");

    let (engine, stores) = engine_with(live_survey(1), vec![Trigger::url_contains("/pricing").unwrap()]);
    stores.set_submissions(SurveyId::new(1), 10).unwrap();
    assert!(engine.decide(SurveyId::new(1), &ctx));

    let (engine, stores) = engine_with(
        live_survey(1),
        vec![Trigger::url_contains("/pricing").unwrap().excluded()],
    );
    stores.set_submissions(SurveyId::new(1), 10).unwrap();
    assert!(!engine.decide(SurveyId::new(1), &ctx));
}

#[test]
fn survey_level_checks_block_rendering() {
    let ctx = VisitorContext::new().with_url("https://site.com/pricing").with_evaluated_at(t0());
    let trigger = || vec![Trigger::url_contains("/pricing").unwrap()];

    let (paused, _) = engine_with(live_survey(1).with_status(SurveyStatus::Paused), trigger());
    assert!(!paused.decide(SurveyId::new(1), &ctx));

    let ended = live_survey(1).with_schedule(Schedule::ending_at(t0() - Duration::days(1)));
    let (ended, _) = engine_with(ended, trigger());
    assert!(!ended.decide(SurveyId::new(1), &ctx));

    let inside = live_survey(1).with_schedule(Schedule::new(Some(t0()), Some(t0())).unwrap());
    let (inside, _) = engine_with(inside, trigger());
    assert!(inside.decide(SurveyId::new(1), &ctx));

    let (goal, stores) = engine_with(live_survey(1), trigger());
    stores.set_submissions(SurveyId::new(1), 100).unwrap();
    assert!(!goal.decide(SurveyId::new(1), &ctx));
}

#[test]
fn unknown_survey_never_renders() {
    let (engine, _) = engine_with(live_survey(1), vec![]);
    assert!(engine.decide(SurveyId::new(1), &VisitorContext::new()));
    assert!(!engine.decide(SurveyId::new(2), &VisitorContext::new()));
}

#[test]
fn decision_ignores_trigger_order() {
    let triggers = vec![
        Trigger::url_contains("/pricing").unwrap(),
        Trigger::geo("US", None).unwrap(),
        Trigger::geo("CA", None).unwrap(),
        Trigger::device_data("plan", DeviceDataMatcher::Is, Some("pro")).unwrap(),
        Trigger::pseudo_event("coupon").unwrap().excluded(),
        Trigger::pageview(3),
    ];
    let contexts = vec![
        VisitorContext::new()
            .with_url("https://site.com/pricing")
            .with_geo(GeoLocation::new("us"))
            .with_device_data("plan", DeviceValue::from("pro"))
            .with_pageview_count(3),
        VisitorContext::new()
            .with_url("https://site.com/pricing")
            .with_geo(GeoLocation::new("CA"))
            .with_device_data("plan", DeviceValue::from("pro"))
            .with_pageview_count(5)
            .with_pseudo_event("coupon"),
        VisitorContext::new()
            .with_url("https://site.com/pricing")
            .with_geo(GeoLocation::new("FR"))
            .with_device_data("plan", DeviceValue::from("pro"))
            .with_pageview_count(5),
        VisitorContext::new().with_geo(GeoLocation::new("US")),
    ];

    let (forward, _) = engine_with(live_survey(1), triggers.clone());
    let mut reversed_triggers = triggers;
    reversed_triggers.reverse();
    let (reversed, _) = engine_with(live_survey(1), reversed_triggers);

    let expected = vec![true, false, false, false];
    for (ctx, want) in contexts.iter().zip(expected) {
        assert_eq!(forward.decide(SurveyId::new(1), ctx), want);
        assert_eq!(reversed.decide(SurveyId::new(1), ctx), want);
    }
}

#[test]
fn frequency_cap_blocks_then_decays() {
    let cap = FrequencyCapConfig::new(3, Some(Interval::hours(24)), CapScope::PerSurvey).unwrap();
    let (engine, _) = engine_with(
        live_survey(1).with_frequency_cap(cap),
        vec![Trigger::url_contains("/pricing").unwrap()],
    );
    let device = DeviceId::new("udid-1");

    for hours in 0..3 {
        let at = t0() + Duration::hours(hours);
        assert!(engine.decide(SurveyId::new(1), &device_ctx(at)));
        engine.record_impression(SurveyId::new(1), &device, at);
    }

    assert!(!engine.decide(SurveyId::new(1), &device_ctx(t0() + Duration::hours(3))));
    assert!(!engine.decide(SurveyId::new(1), &device_ctx(t0() + Duration::hours(23))));
    assert!(engine.decide(
        SurveyId::new(1),
        &device_ctx(t0() + Duration::hours(24) + Duration::seconds(1))
    ));

    // Other devices are unaffected.
    let other = VisitorContext::new()
        .with_url("https://site.com/pricing")
        .with_device_id("udid-2")
        .with_evaluated_at(t0() + Duration::hours(3));
    assert!(engine.decide(SurveyId::new(1), &other));
}

#[test]
fn ignore_frequency_cap_bypasses_the_cap() {
    let cap = FrequencyCapConfig::new(1, None, CapScope::PerSurvey).unwrap();
    let (engine, _) = engine_with(live_survey(1).with_frequency_cap(cap).ignoring_frequency_cap(), vec![]);
    let device = DeviceId::new("udid-1");
    engine.record_impression(SurveyId::new(1), &device, t0());
    engine.record_impression(SurveyId::new(1), &device, t0() + Duration::hours(1));
    assert!(engine.decide(SurveyId::new(1), &device_ctx(t0() + Duration::hours(2))));
}

#[test]
fn account_cap_counts_sibling_surveys() {
    let cap = FrequencyCapConfig::new(2, Some(Interval::days(1)), CapScope::PerAccount).unwrap();
    let stores = Arc::new(InMemoryStores::new());
    stores.insert_survey(live_survey(1).with_frequency_cap(cap)).unwrap();
    stores.insert_survey(live_survey(2)).unwrap();
    let engine = TargetingEngine::in_memory(Arc::clone(&stores), EngineConfig::default());
    let device = DeviceId::new("udid-1");

    engine.record_impression(SurveyId::new(2), &device, t0());
    assert!(engine.decide(SurveyId::new(1), &device_ctx(t0() + Duration::minutes(1))));
    engine.record_impression(SurveyId::new(2), &device, t0() + Duration::minutes(2));
    assert!(!engine.decide(SurveyId::new(1), &device_ctx(t0() + Duration::minutes(3))));
}

#[test]
fn refire_windows() {
    let device = DeviceId::new("udid-1");

    let (once, _) = engine_with(live_survey(1), vec![]);
    once.record_impression(SurveyId::new(1), &device, t0());
    once.record_completion(SurveyId::new(1), &device, t0());
    assert!(!once.decide(SurveyId::new(1), &device_ctx(t0() + Duration::days(365))));

    let (weekly, _) = engine_with(live_survey(1).with_refire(Interval::days(7)), vec![]);
    weekly.record_impression(SurveyId::new(1), &device, t0());
    weekly.record_completion(SurveyId::new(1), &device, t0());
    assert!(!weekly.decide(SurveyId::new(1), &device_ctx(t0() + Duration::days(6))));
    assert!(weekly.decide(SurveyId::new(1), &device_ctx(t0() + Duration::days(8))));
}

#[test]
fn unbounded_intervals_never_panic() {
    let device = DeviceId::new("udid-1");

    let forever = live_survey(1).with_refire(Interval::days(u32::MAX));
    assert!(forever.validate().is_err());
    let (refire, _) = engine_with(forever, vec![]);
    refire.record_impression(SurveyId::new(1), &device, t0());
    refire.record_completion(SurveyId::new(1), &device, t0());
    assert!(!refire.decide(SurveyId::new(1), &device_ctx(t0() + Duration::days(365))));

    let cap = FrequencyCapConfig {
        enabled: true,
        limit: 1,
        duration: Some(Interval::days(u32::MAX)),
        scope: CapScope::PerSurvey,
    };
    assert!(FrequencyCapConfig::new(1, cap.duration, CapScope::PerSurvey).is_err());
    let (capped, _) = engine_with(live_survey(1).with_frequency_cap(cap), vec![]);
    assert!(capped.decide(SurveyId::new(1), &device_ctx(t0())));
    capped.record_impression(SurveyId::new(1), &device, t0());
    assert!(!capped.decide(SurveyId::new(1), &device_ctx(t0() + Duration::hours(1))));
}

#[test]
fn anonymous_visitor_is_not_blocked_by_device_state() {
    let cap = FrequencyCapConfig::new(1, None, CapScope::PerSurvey).unwrap();
    let (engine, _) = engine_with(live_survey(1).with_frequency_cap(cap).stop_showing_without_answer(), vec![]);
    assert!(engine.decide(SurveyId::new(1), &VisitorContext::new()));
}

#[test]
fn device_type_and_dismissal_terms() {
    let targeting = DeviceTargeting {
        native_mobile: false,
        ..DeviceTargeting::all()
    };
    let (engine, _) = engine_with(
        live_survey(1)
            .with_device_targeting(targeting)
            .stop_showing_without_answer(),
        vec![],
    );
    let device = DeviceId::new("udid-1");

    let native = device_ctx(t0()).with_device_type(DeviceType::NativeMobile);
    assert!(!engine.decide(SurveyId::new(1), &native));
    let desktop = device_ctx(t0()).with_device_type(DeviceType::Desktop);
    assert!(engine.decide(SurveyId::new(1), &desktop));

    engine.record_dismissal(SurveyId::new(1), &device, t0());
    assert!(!engine.decide(SurveyId::new(1), &desktop));
}

struct UnavailableHistory;

fn unavailable() -> StorageError {
    StorageError::BackendError("connection refused".to_string())
}

impl DeviceHistoryStore for UnavailableHistory {
    fn get(&self, _device: &DeviceId, _survey: SurveyId) -> Result<Option<DeviceHistory>, StorageError> {
        Err(unavailable())
    }

    fn account_impressions(&self, _device: &DeviceId, _account: AccountId) -> Result<ImpressionLog, StorageError> {
        Err(unavailable())
    }

    fn record_impression(
        &self,
        _device: &DeviceId,
        _account: AccountId,
        _survey: SurveyId,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        Err(unavailable())
    }

    fn record_completion(&self, _device: &DeviceId, _survey: SurveyId, _at: DateTime<Utc>) -> Result<(), StorageError> {
        Err(unavailable())
    }

    fn record_dismissal(&self, _device: &DeviceId, _survey: SurveyId, _at: DateTime<Utc>) -> Result<(), StorageError> {
        Err(unavailable())
    }
}

#[test]
fn history_outage_fails_open() {
    let stores = Arc::new(InMemoryStores::new());
    let cap = FrequencyCapConfig::new(1, Some(Interval::days(1)), CapScope::PerAccount).unwrap();
    stores
        .insert_survey(
            live_survey(1)
                .with_frequency_cap(cap)
                .with_refire(Interval::days(30))
                .stop_showing_without_answer(),
        )
        .unwrap();
    let engine = TargetingEngine::new(
        stores.clone(),
        stores.clone(),
        stores,
        Arc::new(UnavailableHistory),
        EngineConfig::default(),
    );

    let device = DeviceId::new("udid-1");
    engine.record_impression(SurveyId::new(1), &device, t0());
    engine.record_completion(SurveyId::new(1), &device, t0());
    assert!(engine.decide(SurveyId::new(1), &device_ctx(t0())));
}

#[test]
fn persisted_rows_drive_the_decision() {
    let rows: Vec<TriggerRecord> = serde_json::from_str(
        r#"[
            {"type": "UrlTrigger", "url": "/pricing"},
            {"type": "DeviceDataTrigger", "device_data_key": "plan",
             "device_data_matcher": "is_equal_or_more_than", "device_data_value": 2},
            {"type": "PageviewTrigger", "pageviews_count": 2, "excluded": true}
        ]"#,
    )
    .unwrap();
    let stores = Arc::new(InMemoryStores::new());
    stores.insert_survey(live_survey(1)).unwrap();
    let config = EngineConfig::default();
    assert_eq!(
        stores
            .load_trigger_records(SurveyId::new(1), rows, config.regex_size_limit)
            .unwrap(),
        3
    );
    let engine = TargetingEngine::in_memory(stores, config);

    let first_view = VisitorContext::new()
        .with_url("https://site.com/pricing")
        .with_device_data("plan", DeviceValue::from(3))
        .with_pageview_count(1);
    assert!(engine.decide(SurveyId::new(1), &first_view));

    let repeat_view = first_view.clone().with_pageview_count(4);
    assert!(!engine.decide(SurveyId::new(1), &repeat_view));
}
