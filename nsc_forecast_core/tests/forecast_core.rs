use std::collections::BTreeMap;

use nsc_forecast_core::*;

fn ev(id: &str, origin: &str, polarity: f64) -> Evidence {
    Evidence::new(id, format!("claim {}", id), origin, polarity, EvidenceTier::B).unwrap()
}

fn cfg() -> ForecastCfg {
    ForecastCfg::default()
}

fn run_pipeline(state: &mut ForecastState) -> Posterior {
    state.recluster();
    state.aggregate(&cfg()).unwrap()
}

// ---- evidence -----------------------------------------------------------

#[test]
fn evidence_rejects_out_of_range_values() {
    assert!(Evidence::new("e1", "c", "o", 1.5, EvidenceTier::A).is_err());
    assert!(Evidence::new("e1", "c", "o", -1.01, EvidenceTier::A).is_err());
    assert!(Evidence::new("e1", "c", "o", f64::NAN, EvidenceTier::A).is_err());

    let base = Evidence::new("e1", "c", "o", 0.4, EvidenceTier::A).unwrap();
    assert!(base.clone().with_verifiability(-0.1).is_err());
    assert!(base.clone().with_verifiability(1.0).is_ok());
    assert!(base.clone().with_consistency(1.01).is_err());
    assert!(base.with_consistency(0.0).is_ok());
}

#[test]
fn evidence_deserialization_is_validated() {
    let ok = r#"{"id":"e12","claim":"Poll lead widens","polarity":0.6,"type":"B",
        "verifiability":0.8,"corroborationsIndep":3,"consistency":0.7,
        "publishedAt":"2025-03-01","urls":["https://example.com/a"],"originId":"example"}"#;
    let e: Evidence = serde_json::from_str(ok).unwrap();
    assert_eq!(e.id(), "e12");
    assert_eq!(e.tier(), EvidenceTier::B);
    assert_eq!(e.corroborations_indep(), 3);
    assert_eq!(e.published_label(), "2025-03-01");

    let bad = ok.replace("\"polarity\":0.6", "\"polarity\":2.0");
    assert!(serde_json::from_str::<Evidence>(&bad).is_err());
}

#[test]
fn store_rejects_duplicate_ids_and_partitions() {
    let mut store = EvidenceStore::new();
    store.add(ev("e1", "a", 0.5)).unwrap();
    store.add(ev("e2", "b", -0.3)).unwrap();
    store.add(ev("e3", "c", 0.0)).unwrap();

    match store.add(ev("e1", "z", 0.9)) {
        Err(ForecastError::DuplicateId(id)) => assert_eq!(id, "e1"),
        other => panic!("expected DuplicateId, got {:?}", other),
    }
    assert_eq!(store.len(), 3);

    let view = store.all();
    assert_eq!(view.pro.len(), 1);
    assert_eq!(view.con.len(), 1);
    assert_eq!(view.neutral.len(), 1);

    assert_eq!(store.remove(&["e2", "missing"]), vec!["e2".to_string()]);
    assert!(store.remove(&["e2"]).is_empty());
    assert_eq!(store.len(), 2);
    assert!(store.get("e2").is_none());
}

// ---- clusters -----------------------------------------------------------

#[test]
fn singleton_cluster_has_zero_rho() {
    let e = ev("e1", "solo", 0.5).with_consistency(0.95).unwrap();
    let set = cluster_evidence(&[e], &BTreeMap::new());
    let c = set.get("solo").unwrap();
    assert_eq!(c.rho, 0.0);
    assert_eq!(c.m_eff, 1.0);
}

#[test]
fn correlation_adjustment_is_idempotent() {
    let items = vec![
        ev("e1", "wire", 0.5).with_consistency(0.2).unwrap(),
        ev("e2", "wire", 0.5).with_consistency(0.2).unwrap(),
        ev("e3", "wire", 0.5).with_consistency(0.2).unwrap(),
    ];
    let mut set = cluster_evidence(&items, &BTreeMap::new());
    assert!((set.get("wire").unwrap().m_eff - 2.6).abs() < 1e-12);

    let adj = BTreeMap::from([("wire".to_string(), 0.75), ("nope".to_string(), 0.1)]);
    assert_eq!(set.apply_adjustments(&adj), 1);
    let once = set.get("wire").unwrap().m_eff;
    set.apply_adjustments(&adj);
    let twice = set.get("wire").unwrap().m_eff;
    assert_eq!(once.to_bits(), twice.to_bits());
    assert!((once - 1.5).abs() < 1e-12);
    assert!(set.get("wire").unwrap().rho_overridden);
}

// ---- influence ----------------------------------------------------------

#[test]
fn influence_requires_clustering_first() {
    let items = vec![ev("e1", "a", 0.5)];
    let err = compute_influence(&items, &ClusterSet::default(), 0.5, &cfg()).unwrap_err();
    assert!(matches!(err, ForecastError::MissingCluster { .. }));
}

#[test]
fn influence_signs_follow_polarity() {
    let items = vec![ev("p", "a", 0.4), ev("n", "b", -0.4), ev("z", "c", 0.0)];
    let set = cluster_evidence(&items, &BTreeMap::new());
    let infl = compute_influence(&items, &set, 0.3, &cfg()).unwrap();
    assert!(infl[0].log_lr > 0.0 && infl[0].delta_pp > 0.0);
    assert!(infl[1].log_lr < 0.0 && infl[1].delta_pp < 0.0);
    assert_eq!(infl[2].log_lr, 0.0);
    assert_eq!(infl[2].delta_pp, 0.0);
}

#[test]
fn tier_weights_descend() {
    let c = cfg();
    let mk = |t| Evidence::new("e", "c", "o", 0.5, t).unwrap();
    let a = base_log_lr(&mk(EvidenceTier::A), &c);
    let b = base_log_lr(&mk(EvidenceTier::B), &c);
    let cc = base_log_lr(&mk(EvidenceTier::C), &c);
    let d = base_log_lr(&mk(EvidenceTier::D), &c);
    assert!(a > b && b > cc && cc > d && d > 0.0);
}

// ---- scenarios ----------------------------------------------------------

#[test]
fn scenario_a_single_strong_item() {
    let mut state = ForecastState::new("Will X happen?", 0.5, None, &cfg()).unwrap();
    let e = Evidence::new("e1", "Official filing confirms X", "sec.gov", 0.8, EvidenceTier::A)
        .unwrap()
        .with_verifiability(0.9)
        .unwrap()
        .with_corroborations(2);
    state.ingest(e).unwrap();

    let post = run_pipeline(&mut state);
    assert!(post.p_neutral > 0.5);
    assert_eq!(state.clusters().get("sec.gov").unwrap().m_eff, 1.0);

    // 0.8 × 1.0 × 0.95 × (1 + ln 3)
    let expected = 0.8 * 0.95 * (1.0 + 3.0_f64.ln());
    assert!((state.influence()[0].log_lr - expected).abs() < 1e-12);
    assert!((post.p_neutral - sigmoid(expected)).abs() < 1e-12);
}

#[test]
fn scenario_b_correlated_pair_is_discounted() {
    let mk = |id: &str, origin: &str| ev(id, origin, 0.6).with_consistency(0.9).unwrap();

    let mut single = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    single.ingest(mk("e1", "wire")).unwrap();
    run_pipeline(&mut single);
    let one = single.influence()[0].log_lr;

    let mut pair = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    pair.ingest(mk("e1", "wire")).unwrap();
    pair.ingest(mk("e2", "wire")).unwrap();
    run_pipeline(&mut pair);

    let c = pair.clusters().get("wire").unwrap();
    assert!((c.rho - 0.9).abs() < 1e-12);
    assert!((c.m_eff - 1.1).abs() < 1e-12);

    let combined: f64 = pair.influence().iter().map(|i| i.log_lr).sum();
    assert!((combined - 1.1 * one).abs() < 1e-12);
    assert!(combined < 0.6 * 2.0 * one);
}

#[test]
fn scenario_c_duplicate_flag_removes_one_item() {
    let mut state = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    state.ingest(ev("e1", "wire", 0.6).with_consistency(0.9).unwrap()).unwrap();
    state.ingest(ev("e2", "wire", 0.6).with_consistency(0.9).unwrap()).unwrap();
    let before = run_pipeline(&mut state).p_neutral;

    let critique = Critique {
        duplication_flags: vec![DuplicationFlag::single("e2")],
        ..Critique::default()
    };
    let effect = state.apply_critique(critique.clone(), false);
    assert_eq!(effect.removed, vec!["e2".to_string()]);
    assert!(effect.needs_recluster());
    assert_eq!(state.influence().len(), 1);

    let after = run_pipeline(&mut state).p_neutral;
    assert_eq!(state.evidence().len(), 1);
    assert_eq!(state.clusters().get("wire").unwrap().n(), 1);
    assert!(after < before);

    // repeat flag is a no-op
    let again = state.apply_critique(critique, false);
    assert!(again.removed.is_empty());
    assert_eq!(state.removed_ids().len(), 1);
    assert_eq!(state.iteration(), 2);
}

#[test]
fn group_flag_keeps_first_present_member() {
    let mut state = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    for id in ["e1", "e2", "e3"] {
        state.ingest(ev(id, "wire", 0.5)).unwrap();
    }
    let critique = Critique {
        duplication_flags: vec![DuplicationFlag::group(["e9", "e2", "e3"])],
        ..Critique::default()
    };
    let effect = state.apply_critique(critique, false);
    assert_eq!(effect.removed, vec!["e3".to_string()]);
    assert!(state.evidence().contains("e1"));
    assert!(state.evidence().contains("e2"));
}

#[test]
fn removed_ids_are_not_regathered() {
    let mut state = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    state.ingest(ev("e1", "a", 0.5)).unwrap();
    state.apply_critique(
        Critique {
            duplication_flags: vec![DuplicationFlag::single("e1")],
            ..Critique::default()
        },
        false,
    );
    let stats = state.ingest_gathered(vec![ev("e1", "a", 0.5), ev("e2", "b", 0.5), ev("e2", "b", 0.5)]);
    assert_eq!(stats.added, 1);
    assert_eq!(stats.skipped_removed, 1);
    assert_eq!(stats.skipped_duplicate, 1);
}

#[test]
fn overrides_apply_on_next_clustering_pass() {
    let mut state = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    state.ingest(ev("e1", "wire", 0.5).with_consistency(0.1).unwrap()).unwrap();
    state.ingest(ev("e2", "wire", 0.5).with_consistency(0.1).unwrap()).unwrap();
    let before = run_pipeline(&mut state).p_neutral;
    let stale = state.influence().to_vec();

    state.apply_critique(
        Critique {
            correlation_adjustments: BTreeMap::from([("wire".to_string(), 1.0)]),
            ..Critique::default()
        },
        false,
    );
    // superseded influence is untouched until the next pass
    assert_eq!(state.influence(), stale.as_slice());

    let after = run_pipeline(&mut state).p_neutral;
    assert_eq!(state.clusters().get("wire").unwrap().m_eff, 1.0);
    assert!(after < before);

    // later passes keep honouring the override
    let again = run_pipeline(&mut state).p_neutral;
    assert_eq!(after.to_bits(), again.to_bits());
}

// ---- posterior ----------------------------------------------------------

#[test]
fn aggregation_is_idempotent() {
    let mut state = ForecastState::new("q", 0.37, Some(0.6), &cfg()).unwrap();
    state.ingest(ev("e1", "a", 0.3)).unwrap();
    state.ingest(ev("e2", "a", -0.7)).unwrap();
    state.ingest(ev("e3", "b", 0.9)).unwrap();
    state.recluster();
    let first = state.aggregate(&cfg()).unwrap();
    let second = state.aggregate(&cfg()).unwrap();
    assert_eq!(first.p_neutral.to_bits(), second.p_neutral.to_bits());
    assert_eq!(first.p_aware.map(f64::to_bits), second.p_aware.map(f64::to_bits));
    assert!(first.p_aware.is_some());
}

#[test]
fn overwhelming_evidence_is_clamped() {
    let c = cfg();
    let mut yes = ForecastState::new("q", 0.5, None, &c).unwrap();
    let mut no = ForecastState::new("q", 0.5, None, &c).unwrap();
    for i in 0..200 {
        let strong = |p: f64| {
            Evidence::new(format!("e{}", i), "c", format!("o{}", i), p, EvidenceTier::A)
                .unwrap()
                .with_verifiability(1.0)
                .unwrap()
                .with_corroborations(20)
        };
        yes.ingest(strong(1.0)).unwrap();
        no.ingest(strong(-1.0)).unwrap();
    }
    let p_yes = run_pipeline(&mut yes).p_neutral;
    let p_no = run_pipeline(&mut no).p_neutral;
    assert!(p_yes < 1.0 && p_yes <= 1.0 - c.epsilon);
    assert!((p_yes - (1.0 - c.epsilon)).abs() < 1e-12);
    assert!(p_no > 0.0 && p_no >= c.epsilon);
}

#[test]
fn market_blend_sits_between_inputs() {
    let mut state = ForecastState::new("q", 0.5, Some(0.2), &cfg()).unwrap();
    state.ingest(ev("e1", "a", 0.9)).unwrap();
    let post = run_pipeline(&mut state);
    let aware = post.p_aware.unwrap();
    assert!(aware < post.p_neutral && aware > 0.2);
}

#[test]
fn prior_must_be_a_probability() {
    assert!(ForecastState::new("q", 1.2, None, &cfg()).is_err());
    assert!(ForecastState::new("q", 0.5, Some(-0.1), &cfg()).is_err());
    let s = ForecastState::new("q", 0.0, None, &cfg()).unwrap();
    assert_eq!(s.p0(), 0.001);
}

// ---- critique + phases --------------------------------------------------

#[test]
fn critique_json_boundary() {
    let json = r#"{
        "missing": ["no polling after May"],
        "duplicationFlags": ["e3", "e4, e5", ["e6", "e7"]],
        "dataConcerns": [],
        "followUpSearches": [{"query": "latest poll", "rationale": "gap", "side": "AGAINST"}],
        "correlationAdjustments": {"reuters": 0.8},
        "confidenceIssues": []
    }"#;
    let c = Critique::from_json(json).unwrap();
    assert_eq!(c.duplication_flags[0], DuplicationFlag::single("e3"));
    assert_eq!(c.duplication_flags[1], DuplicationFlag::group(["e4", "e5"]));
    assert_eq!(c.duplication_flags[2], DuplicationFlag::group(["e6", "e7"]));
    assert_eq!(c.follow_up_searches[0].side, SearchSide::Against);

    let bad_side = json.replace("AGAINST", "SIDEWAYS");
    assert!(Critique::from_json(&bad_side).is_err());

    let bad_rho = json.replace("0.8", "1.5");
    assert!(matches!(Critique::from_json(&bad_rho), Err(ForecastError::InvalidCritique(_))));

    let many: Vec<String> = (0..11)
        .map(|i| format!(r#"{{"query":"q{}","rationale":"r","side":"BOTH"}}"#, i))
        .collect();
    let too_many = format!(r#"{{"followUpSearches":[{}]}}"#, many.join(","));
    assert!(matches!(Critique::from_json(&too_many), Err(ForecastError::InvalidCritique(_))));
}

#[test]
fn fallback_critique_shape() {
    let c = Critique::fallback("Will it rain?");
    assert!(c.missing.is_empty() && c.duplication_flags.is_empty());
    assert_eq!(c.follow_up_searches.len(), 1);
    assert_eq!(c.follow_up_searches[0].side, SearchSide::Both);
    assert_eq!(c.follow_up_searches[0].query, "Will it rain? recent news");
    assert_eq!(c.confidence_issues, vec![DEGRADED_ANALYSIS_NOTE.to_string()]);
    assert!(c.validate().is_ok());
}

#[test]
fn decide_respects_budget() {
    let c = cfg();
    let with = Critique::fallback("q");
    let without = Critique::default();
    assert_eq!(decide_after_critique(&with, 1, &c), Phase::FollowupGathering);
    assert_eq!(decide_after_critique(&with, 2, &c), Phase::Finalized);
    assert_eq!(decide_after_critique(&without, 1, &c), Phase::Finalized);
}

#[test]
fn phase_edges() {
    assert!(Phase::Gathering.can_transition_to(Phase::Clustering));
    assert!(Phase::FollowupGathering.can_transition_to(Phase::Clustering));
    assert!(!Phase::Gathering.can_transition_to(Phase::Critiquing));
    assert!(!Phase::Finalized.can_transition_to(Phase::Clustering));

    let mut s = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    assert!(!s.advance(Phase::Aggregating));
    assert_eq!(s.phase(), Phase::Gathering);
    assert!(s.advance(Phase::Clustering));
}

// ---- config + report ----------------------------------------------------

#[test]
fn config_from_toml() {
    let c = ForecastCfg::from_toml_str(
        r#"
        max_iterations = 3
        market_blend_weight = 0.25

        [tier_weights]
        d = 0.1
        "#,
    )
    .unwrap();
    assert_eq!(c.max_iterations, 3);
    assert_eq!(c.market_blend_weight, 0.25);
    assert_eq!(c.tier_weights.d, 0.1);
    assert_eq!(c.tier_weights.a, 1.0);
    assert_eq!(c.epsilon, 0.001);

    assert!(ForecastCfg::from_toml_str("call_retries = 2").is_err());
    assert!(ForecastCfg::from_toml_str("max_follow_ups = 11").is_err());
    assert!(ForecastCfg::from_toml_str("[tier_weights]\nb = 2.0").is_err());
}

#[test]
fn report_catalog_ranks_by_delta_pp() {
    let mut state = ForecastState::new("Will X happen?", 0.5, None, &cfg()).unwrap();
    state
        .ingest(
            Evidence::new("e1", "weak support", "blog", 0.2, EvidenceTier::D)
                .unwrap()
                .with_url("https://www.blog.example/post"),
        )
        .unwrap();
    state.ingest(ev("e2", "reuters", 0.9)).unwrap();
    state.ingest(ev("e3", "ap", -0.5)).unwrap();
    run_pipeline(&mut state);

    let cat = ReportCatalog::build(&state, 2);
    assert_eq!(cat.entries.len(), 2);
    assert_eq!(cat.entries[0].evidence_id, "e2");
    assert_eq!(cat.entries[1].evidence_id, "e1");
    assert_eq!(cat.entries[1].source_domain, "blog.example");
    assert_eq!(cat.entries[0].source_domain, "unknown");
    assert_eq!(cat.direction, "YES");
    assert!((cat.confidence - (state.p_neutral() - 0.5).abs() * 200.0).abs() < 1e-12);

    let line = cat.entries[1].line();
    assert!(line.starts_with("- e1 | + | Type D | Δpp="));
    assert!(line.contains("date=n/a"));
    assert!(line.contains("cluster=blog, rho=0.00, mEff=1.00"));

    let md = cat.render_markdown();
    assert!(md.starts_with("## Forecast: YES"));
    assert!(md.contains("- p_aware = (not computed)"));
}

// ---- edge cases ---------------------------------------------------------

#[test]
fn tiny_polarity_keeps_its_sign() {
    let c = cfg();
    for (p, positive) in [(1e-17, true), (-1e-17, false), (1e-300, true), (-1e-300, false)] {
        let items = vec![Evidence::new("e1", "c", "o", p, EvidenceTier::A).unwrap()];
        let set = cluster_evidence(&items, &BTreeMap::new());
        let item = &compute_influence(&items, &set, 0.5, &c).unwrap()[0];
        if positive {
            assert!(item.log_lr > 0.0 && item.delta_pp > 0.0, "p={} {:?}", p, item);
        } else {
            assert!(item.log_lr < 0.0 && item.delta_pp < 0.0, "p={} {:?}", p, item);
        }
    }
}

#[test]
fn delta_pp_matches_posterior_shift() {
    for p0 in [0.001, 0.2, 0.5, 0.9] {
        for l in [-40.0, -3.0, -0.2, 0.01, 1.5, 25.0] {
            let direct = sigmoid(logit(p0) + l) - p0;
            assert!((delta_pp(p0, l) - direct).abs() < 1e-12, "p0={} l={}", p0, l);
        }
    }
    assert!((delta_pp(0.3, 1e6) - 0.7).abs() < 1e-12);
    assert!((delta_pp(0.3, -1e6) + 0.3).abs() < 1e-12);
}

#[test]
fn published_at_accepts_na_and_timestamps() {
    let wire = |published: &str| {
        format!(
            r#"{{"id":"e1","claim":"c","polarity":0.2,"type":"C","verifiability":0.5,
            "consistency":0.5,"publishedAt":{},"originId":"o"}}"#,
            published
        )
    };

    let na: Evidence = serde_json::from_str(&wire(r#""n/a""#)).unwrap();
    assert_eq!(na.published_at(), None);
    let back = serde_json::to_value(&na).unwrap();
    assert_eq!(back["publishedAt"], "n/a");

    let stamped: Evidence = serde_json::from_str(&wire(r#""2025-03-01T12:00:00Z""#)).unwrap();
    assert_eq!(stamped.published_label(), "2025-03-01");

    let offset: Evidence = serde_json::from_str(&wire(r#""2025-03-01T23:30:00-02:00""#)).unwrap();
    assert_eq!(offset.published_label(), "2025-03-02");

    let null: Evidence = serde_json::from_str(&wire("null")).unwrap();
    assert_eq!(null.published_at(), None);

    assert!(serde_json::from_str::<Evidence>(&wire(r#""last tuesday""#)).is_err());
}

#[test]
fn repeated_id_in_group_is_kept() {
    let mut state = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    state.ingest(ev("e2", "wire", 0.5)).unwrap();

    let effect = state.apply_critique(
        Critique {
            duplication_flags: vec![DuplicationFlag::group(["e2", "e2"])],
            ..Critique::default()
        },
        false,
    );
    assert!(effect.removed.is_empty());

    let parsed = Critique::from_json(r#"{"duplicationFlags":["e2, e2"]}"#).unwrap();
    let effect = state.apply_critique(parsed, false);
    assert!(effect.removed.is_empty());
    assert_eq!(state.evidence().len(), 1);
}

#[test]
fn weak_item_joining_a_cluster_dilutes_it() {
    // the cluster's combined weight is shared by m_eff / n, so a weak member
    // of the same origin can lower the estimate; a fresh origin cannot
    let strong = Evidence::new("strong", "c", "wire", 1.0, EvidenceTier::A)
        .unwrap()
        .with_consistency(1.0)
        .unwrap();
    let weak = |origin: &str| {
        Evidence::new("weak", "c", origin, 0.05, EvidenceTier::D)
            .unwrap()
            .with_consistency(1.0)
            .unwrap()
    };

    let mut alone = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    alone.ingest(strong.clone()).unwrap();
    let p_alone = run_pipeline(&mut alone).p_neutral;

    let mut same = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    same.ingest(strong.clone()).unwrap();
    same.ingest(weak("wire")).unwrap();
    let p_same = run_pipeline(&mut same).p_neutral;
    assert!(p_same < p_alone);

    let mut fresh = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    fresh.ingest(strong).unwrap();
    fresh.ingest(weak("blog")).unwrap();
    let p_fresh = run_pipeline(&mut fresh).p_neutral;
    assert!(p_fresh > p_alone);
}

#[test]
fn neutral_entry_has_zero_sign() {
    let mut state = ForecastState::new("q", 0.5, None, &cfg()).unwrap();
    state.ingest(ev("n1", "a", 0.0)).unwrap();
    run_pipeline(&mut state);
    let cat = ReportCatalog::build(&state, 5);
    assert!(cat.entries[0].line().starts_with("- n1 | 0 | Type B"));
}
