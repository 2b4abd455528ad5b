use redirect_common::{
    Command, CommandResponse, GlobalSwitch, HttpMethod, ObservedRequest, RedirectRecord,
};
use redirect_core::{
    DomainRegistry, MemoryRuleEngine, MemoryStore, Metrics, NoopNotifier, RedirectService,
    RuleEngine, ServiceConfig,
};
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryStore>,
    engine: Arc<MemoryRuleEngine>,
    service: RedirectService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(MemoryRuleEngine::new());
    let service = RedirectService::new(
        &ServiceConfig::default(),
        store.clone(),
        engine.clone(),
        Arc::new(NoopNotifier),
        Arc::new(Metrics::default()),
    );
    Harness {
        store,
        engine,
        service,
    }
}

impl Harness {
    async fn add(&self, from: &str, to: &str, method: HttpMethod) -> RedirectRecord {
        let response = self
            .service
            .handle(Command::AddRedirect {
                from_url: from.into(),
                to_url: to.into(),
                method,
                rule_id: None,
            })
            .await;
        match response {
            CommandResponse::Saved { redirect } => redirect,
            other => panic!("unexpected response {:?}", other),
        }
    }

    async fn switch(&self, status: GlobalSwitch) -> CommandResponse {
        self.service
            .handle(Command::EnableDisableExtension { status })
            .await
    }

    async fn snapshot(&self) -> (Vec<RedirectRecord>, GlobalSwitch) {
        match self.service.handle(Command::GetAllData { search: None }).await {
            CommandResponse::Data(snapshot) => (snapshot.redirects, snapshot.on_off),
            other => panic!("unexpected response {:?}", other),
        }
    }

    async fn installed(&self) -> Vec<u32> {
        self.engine.rule_ids().await.unwrap()
    }
}

#[tokio::test]
async fn test_add_while_on_installs_pair() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;

    let first = h
        .add("https://api.ex.com/#", "http://localhost:3000/#", HttpMethod::Get)
        .await;
    let second = h
        .add("https://web.ex.com/a", "http://localhost:3000/a", HttpMethod::Post)
        .await;

    assert_eq!(first.id, 1);
    assert_eq!(second.id, 3);
    assert!(first.enabled && second.enabled);
    assert_eq!(h.installed().await, vec![1, 2, 3, 4]);

    let rule = h.engine.get(3).await.unwrap();
    assert_eq!(rule.priority, 3);
    assert_eq!(rule.condition.request_methods, vec!["post".to_string()]);

    // Newest first
    let (redirects, switch) = h.snapshot().await;
    assert_eq!(switch, GlobalSwitch::On);
    assert_eq!(redirects.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 1]);
}

#[tokio::test]
async fn test_switch_off_keeps_engine_empty() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;
    h.add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    assert!(!h.engine.is_empty().await);

    match h.switch(GlobalSwitch::Off).await {
        CommandResponse::Synced { report } => assert_eq!(report.removed.len(), 2),
        other => panic!("unexpected response {:?}", other),
    }
    assert!(h.engine.is_empty().await);

    // Nothing installs while OFF
    let added = h
        .add("https://ex.com/b", "http://localhost:3000/b", HttpMethod::Get)
        .await;
    h.service
        .handle(Command::EnableDisableRedirect {
            rule_id: added.id,
            status: true,
        })
        .await;
    h.service.handle(Command::ReSyncRedirects).await;
    assert!(h.engine.is_empty().await);
}

#[tokio::test]
async fn test_switch_on_installs_only_enabled_records() {
    let h = harness();
    let kept = h
        .add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    let disabled = h
        .add("https://ex.com/b", "http://localhost:3000/b", HttpMethod::Get)
        .await;
    h.service
        .handle(Command::EnableDisableRedirect {
            rule_id: disabled.id,
            status: false,
        })
        .await;

    match h.switch(GlobalSwitch::On).await {
        CommandResponse::Synced { report } => {
            assert_eq!(report.installed, vec![kept.id]);
            assert!(report.is_complete());
        }
        other => panic!("unexpected response {:?}", other),
    }
    assert_eq!(h.installed().await, kept.rule_ids().to_vec());
}

#[tokio::test]
async fn test_delete_while_off_leaves_no_orphan() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;
    let doomed = h
        .add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    h.switch(GlobalSwitch::Off).await;

    let response = h
        .service
        .handle(Command::DeleteRedirect { rule_id: doomed.id })
        .await;
    assert_eq!(response, CommandResponse::Done);

    h.switch(GlobalSwitch::On).await;
    assert!(h.engine.is_empty().await);
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;
    h.add("https://ex.com/#", "http://localhost:3000/#", HttpMethod::Get)
        .await;
    h.add("https://ex.org/x", "http://localhost:4000/x", HttpMethod::Put)
        .await;

    h.service.handle(Command::ReSyncRedirects).await;
    let once = h.engine.rules().await.unwrap();
    h.service.handle(Command::ReSyncRedirects).await;
    let twice = h.engine.rules().await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.len(), 4);
}

#[tokio::test]
async fn test_resync_removes_foreign_rules() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;
    let record = h
        .add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;

    // A rule with no record behind it
    let stray = redirect_core::CompiledRulePair::compile(
        &RedirectRecord::new(41, "https://x.com/", "http://y.com/", HttpMethod::Get, "x.com"),
        &redirect_common::TokenSet::placeholder(),
    );
    h.engine.update_rules(stray.into_rules(), vec![]).await.unwrap();

    match h.service.handle(Command::ReSyncRedirects).await {
        CommandResponse::Synced { report } => assert_eq!(report.removed, vec![41, 42]),
        other => panic!("unexpected response {:?}", other),
    }
    assert_eq!(h.installed().await, record.rule_ids().to_vec());
}

#[tokio::test]
async fn test_edit_moves_to_front_and_enables() {
    let h = harness();
    let first = h
        .add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    h.add("https://ex.com/b", "http://localhost:3000/b", HttpMethod::Get)
        .await;
    h.service
        .handle(Command::EnableDisableRedirect {
            rule_id: first.id,
            status: false,
        })
        .await;

    let response = h
        .service
        .handle(Command::EditRedirect {
            from_url: "https://ex.com/c/#".into(),
            to_url: "http://localhost:3000/c/#".into(),
            method: HttpMethod::Delete,
            rule_id: first.id,
        })
        .await;
    let edited = match response {
        CommandResponse::Saved { redirect } => redirect,
        other => panic!("unexpected response {:?}", other),
    };
    assert!(edited.enabled);
    assert_eq!(edited.method, HttpMethod::Delete);

    let (redirects, _) = h.snapshot().await;
    assert_eq!(redirects.len(), 2);
    assert_eq!(redirects[0].id, first.id);
    assert_eq!(redirects[0].from, "https://ex.com/c/#");
}

#[tokio::test]
async fn test_add_with_rule_id_edits() {
    let h = harness();
    let record = h
        .add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;

    h.service
        .handle(Command::AddRedirect {
            from_url: "https://ex.com/z".into(),
            to_url: "http://localhost:3000/z".into(),
            method: HttpMethod::Get,
            rule_id: Some(record.id),
        })
        .await;

    let (redirects, _) = h.snapshot().await;
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].from, "https://ex.com/z");
}

#[tokio::test]
async fn test_missing_and_invalid_redirects_are_errors() {
    let h = harness();

    let response = h.service.handle(Command::DeleteRedirect { rule_id: 7 }).await;
    assert!(response.is_error());

    let response = h
        .service
        .handle(Command::EditRedirect {
            from_url: "https://ex.com/a".into(),
            to_url: "http://localhost:3000/a".into(),
            method: HttpMethod::Get,
            rule_id: 7,
        })
        .await;
    assert!(response.is_error());

    // More back-references than groups
    let response = h
        .service
        .handle(Command::AddRedirect {
            from_url: "https://ex.com/a".into(),
            to_url: "http://localhost:3000/#".into(),
            method: HttpMethod::Get,
            rule_id: None,
        })
        .await;
    match response {
        CommandResponse::Error { message } => assert!(message.contains("placeholder")),
        other => panic!("unexpected response {:?}", other),
    }

    let (redirects, _) = h.snapshot().await;
    assert!(redirects.is_empty());
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let h = harness();
    h.store.fail_writes(true);

    let response = h
        .service
        .handle(Command::AddRedirect {
            from_url: "https://ex.com/a".into(),
            to_url: "http://localhost:3000/a".into(),
            method: HttpMethod::Get,
            rule_id: None,
        })
        .await;
    assert!(response.is_error());

    h.store.fail_writes(false);
    h.store.fail_reads(true);
    assert!(h
        .service
        .handle(Command::GetAllData { search: None })
        .await
        .is_error());
}

#[tokio::test]
async fn test_search_filters_case_insensitively() {
    let h = harness();
    h.add("https://Alpha.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    h.add("https://beta.com/b", "http://localhost:4000/b", HttpMethod::Get)
        .await;

    let response = h
        .service
        .handle(Command::GetAllData {
            search: Some("ALPHA".into()),
        })
        .await;
    match response {
        CommandResponse::Data(snapshot) => {
            assert_eq!(snapshot.redirects.len(), 1);
            assert_eq!(snapshot.redirects[0].domain, "alpha.com");
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_domain_registry_follows_records() {
    let h = harness();
    let domains = DomainRegistry::new(h.store.clone());

    let a = h
        .add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    let b = h
        .add("https://ex.com/b", "http://localhost:3000/b", HttpMethod::Get)
        .await;
    h.add("https://other.org/", "http://localhost:3000/", HttpMethod::Get)
        .await;
    assert_eq!(domains.list().await.unwrap(), vec!["ex.com", "other.org"]);

    h.service.handle(Command::DeleteRedirect { rule_id: a.id }).await;
    assert_eq!(domains.list().await.unwrap(), vec!["ex.com", "other.org"]);

    h.service.handle(Command::DeleteRedirect { rule_id: b.id }).await;
    assert_eq!(domains.list().await.unwrap(), vec!["other.org"]);
}

#[tokio::test]
async fn test_bootstrap_seeds_only_on_first_install() {
    let h = harness();
    let registry = h.service.registry();

    registry.bootstrap(true).await.unwrap();
    let (redirects, switch) = h.snapshot().await;
    assert_eq!(
        redirects.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![1, 3, 5, 7, 9]
    );
    assert!(redirects.iter().all(|r| !r.enabled));
    assert_eq!(switch, GlobalSwitch::Off);

    // Existing data is never overwritten
    h.service.handle(Command::DeleteRedirect { rule_id: 1 }).await;
    registry.bootstrap(true).await.unwrap();
    assert_eq!(h.snapshot().await.0.len(), 4);
}

#[tokio::test]
async fn test_bootstrap_clears_stale_rules() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;
    h.add("https://ex.com/a", "http://localhost:3000/a", HttpMethod::Get)
        .await;
    assert!(!h.engine.is_empty().await);

    h.service.registry().bootstrap(false).await.unwrap();
    assert!(h.engine.is_empty().await);
    assert!(h.store.peek("redirects").is_some());
}

#[tokio::test]
async fn test_pasted_whitespace_is_trimmed() {
    let h = harness();
    h.switch(GlobalSwitch::On).await;
    let record = h
        .add("  https://ex.com/api/#", "http://localhost:3000/#\n", HttpMethod::Get)
        .await;
    assert_eq!(record.from, "https://ex.com/api/#");
    assert_eq!(record.to, "http://localhost:3000/#");

    let (redirects, _) = h.snapshot().await;
    assert_eq!(redirects[0].from, "https://ex.com/api/#");

    let evaluation = h
        .engine
        .evaluate(&ObservedRequest::new("GET", "https://ex.com/api/users"))
        .await;
    assert_eq!(evaluation.url, "http://localhost:3000/users");
}
