//! Critique controller: the bounded critique-then-refine loop of one session.
//!
//! The controller owns the session's `ForecastState` and is its only writer.
//! External calls (search, critic, drivers, report) are the only suspension
//! points; each runs under the call policy and degrades to a fixed fallback.
//! Clustering, aggregation and critique run strictly one after another.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use nsc_forecast_core::{
    decide_after_critique, fallback_drivers, validate_drivers, Critique, Evidence, ForecastCfg,
    ForecastSnapshot, ForecastState, FollowUpSearch, IngestStats, Phase, ReportCatalog, SearchSide,
};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, SessionError, SessionResult};
use crate::policy::{call_with_policy, CallPolicy};
use crate::services::{
    CriticService, CritiqueRequest, DriverContext, DriverGenerator, EvidenceSource, MarketContext,
    NarrativeReporter, SearchRequest,
};

/// Claims handed to the driver generator.
const DRIVER_CONTEXT_CLAIMS: usize = 5;

pub struct CritiqueController {
    cfg: ForecastCfg,
    policy: CallPolicy,
    market: MarketContext,
    state: ForecastState,
    source: Arc<dyn EvidenceSource>,
    critic: Arc<dyn CriticService>,
    driver_gen: Option<Arc<dyn DriverGenerator>>,
    search_start: Option<NaiveDate>,
}

impl CritiqueController {
    /// Start a session in `Gathering`. The configuration is validated here and
    /// stays fixed for the whole session.
    pub fn new(
        market: MarketContext,
        cfg: ForecastCfg,
        source: Arc<dyn EvidenceSource>,
        critic: Arc<dyn CriticService>,
    ) -> SessionResult<Self> {
        cfg.validate()?;
        let state = ForecastState::new(
            market.question.clone(),
            market.p0(),
            market.market_probability,
            &cfg,
        )?;
        Ok(Self {
            policy: CallPolicy::from_cfg(&cfg),
            cfg,
            market,
            state,
            source,
            critic,
            driver_gen: None,
            search_start: None,
        })
    }

    pub fn with_driver_generator(mut self, generator: Arc<dyn DriverGenerator>) -> Self {
        self.driver_gen = Some(generator);
        self
    }

    /// Only evidence published on or after `date` is requested from the source.
    pub fn with_search_start(mut self, date: NaiveDate) -> Self {
        self.search_start = Some(date);
        self
    }

    pub fn state(&self) -> &ForecastState {
        &self.state
    }

    pub fn into_state(self) -> ForecastState {
        self.state
    }

    pub fn snapshot(&self) -> ForecastSnapshot {
        self.state.snapshot()
    }

    pub fn cfg(&self) -> &ForecastCfg {
        &self.cfg
    }

    fn transition(&mut self, next: Phase) -> SessionResult<()> {
        let from = self.state.phase();
        if !self.state.advance(next) {
            return Err(SessionError::IllegalTransition { from, to: next });
        }
        debug!(%from, to = %next, iteration = self.state.iteration(), "phase");
        Ok(())
    }

    fn require_phase(&self, expected: Phase) -> SessionResult<()> {
        let actual = self.state.phase();
        if actual != expected {
            return Err(SessionError::WrongPhase { expected, actual });
        }
        Ok(())
    }

    // ---- gathering ------------------------------------------------------

    /// Seed the session with already-typed evidence. A duplicate id is a data
    /// error and aborts the seeding.
    pub fn seed(&mut self, evidence: Vec<Evidence>) -> SessionResult<usize> {
        self.require_phase(Phase::Gathering)?;
        let n = evidence.len();
        for ev in evidence {
            self.state.ingest(ev)?;
        }
        Ok(n)
    }

    /// Search for and against the question concurrently and ingest the results.
    /// A failing side contributes nothing.
    pub async fn gather_initial(&mut self) -> SessionResult<IngestStats> {
        self.require_phase(Phase::Gathering)?;
        let question = self.state.question().to_string();
        let pro_req = SearchRequest::new(question.clone(), SearchSide::For).since(self.search_start);
        let con_req = SearchRequest::new(question, SearchSide::Against).since(self.search_start);

        let (pro, con) = tokio::join!(self.search(&pro_req), self.search(&con_req));

        let mut batch = pro;
        batch.extend(con);
        let stats = self.state.ingest_gathered(batch);
        info!(
            added = stats.added,
            skipped = stats.skipped_duplicate + stats.skipped_removed,
            "initial evidence gathered"
        );
        Ok(stats)
    }

    async fn search(&self, req: &SearchRequest) -> Vec<Evidence> {
        let source = &self.source;
        match call_with_policy("evidence_source", self.policy, move || source.search(req)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(query = %req.query, side = %req.side, error = %e, "search failed, no evidence from this query");
                Vec::new()
            }
        }
    }

    async fn gather_follow_ups(&mut self, searches: &[FollowUpSearch]) -> IngestStats {
        let requests: Vec<SearchRequest> = searches
            .iter()
            .take(self.cfg.max_follow_ups)
            .map(|f| SearchRequest::new(f.query.clone(), f.side).since(self.search_start))
            .collect();

        // fan-out; results are merged in query order
        let results = join_all(requests.iter().map(|r| self.search(r))).await;
        let batch: Vec<Evidence> = results.into_iter().flatten().collect();

        let stats = self.state.ingest_gathered(batch);
        info!(
            queries = requests.len(),
            added = stats.added,
            skipped = stats.skipped_duplicate + stats.skipped_removed,
            "follow-up evidence gathered"
        );
        stats
    }

    // ---- critique -------------------------------------------------------

    /// Ask the critic. Any failure, timeout or contract violation yields the
    /// fallback critique; the bool is true in that case.
    async fn critique(&self) -> (Critique, bool) {
        let view = self.state.evidence().all();
        let req = CritiqueRequest {
            question: self.state.question().to_string(),
            pro: view.pro.into_iter().cloned().collect(),
            con: view.con.into_iter().cloned().collect(),
        };

        let critic = &self.critic;
        let req = &req;
        let result = call_with_policy("critic", self.policy, move || async move {
            let c = critic.critique(req).await?;
            c.validate()
                .map_err(|e| ServiceError::malformed("critic", e.to_string()))?;
            Ok::<_, ServiceError>(c)
        })
        .await;

        match result {
            Ok(c) => (c, false),
            Err(e) => {
                warn!(
                    iteration = self.state.iteration() + 1,
                    error = %e,
                    "critic unavailable, using default critique"
                );
                (Critique::fallback(self.state.question()), true)
            }
        }
    }

    // ---- loop -----------------------------------------------------------

    /// Drive the session from `Gathering` to `Finalized` and return the snapshot.
    ///
    /// Terminates within `max_iterations` critique cycles whatever the external
    /// services do. Only core invariant violations return an error.
    pub async fn run(&mut self) -> SessionResult<ForecastSnapshot> {
        if self.state.phase().is_terminal() {
            return Ok(self.state.snapshot());
        }
        self.transition(Phase::Clustering)?;

        loop {
            self.state.recluster();
            self.transition(Phase::Aggregating)?;

            let post = self.state.aggregate(&self.cfg)?;
            info!(
                iteration = self.state.iteration(),
                evidence = self.state.evidence().len(),
                clusters = self.state.clusters().len(),
                p_neutral = post.p_neutral,
                "aggregated"
            );

            self.transition(Phase::Critiquing)?;
            let (critique, degraded) = self.critique().await;
            let follow_ups = critique.follow_up_searches.clone();
            let next = decide_after_critique(&critique, self.state.iteration() + 1, &self.cfg);
            let effect = self.state.apply_critique(critique, degraded);

            match next {
                Phase::FollowupGathering => {
                    self.transition(Phase::FollowupGathering)?;
                    self.gather_follow_ups(&follow_ups).await;
                    self.transition(Phase::Clustering)?;
                }
                Phase::Finalized => {
                    if effect.needs_recluster() {
                        // settle removals/overrides from the last critique; no further critic call
                        self.state.recluster();
                        self.state.aggregate(&self.cfg)?;
                    }
                    self.transition(Phase::Finalized)?;
                    self.finalize_drivers().await;
                    let snap = self.state.snapshot();
                    info!(
                        iteration = snap.iteration,
                        p_neutral = snap.p_neutral,
                        p_aware = ?snap.p_aware,
                        degraded_cycles = self.state.degraded_cycles(),
                        "forecast finalized"
                    );
                    return Ok(snap);
                }
                other => {
                    return Err(SessionError::IllegalTransition {
                        from: Phase::Critiquing,
                        to: other,
                    })
                }
            }
        }
    }

    // ---- finalization consumers ----------------------------------------

    async fn finalize_drivers(&mut self) {
        let question = self.state.question().to_string();
        let drivers = match self.driver_gen.clone() {
            None => fallback_drivers(&question),
            Some(generator) => {
                let ctx = self.driver_context();
                let ctx = &ctx;
                let generator = &generator;
                let result = call_with_policy("driver_generator", self.policy, move || async move {
                    let d = generator.drivers(ctx).await?;
                    validate_drivers(&d).map_err(|r| ServiceError::malformed("driver_generator", r))?;
                    Ok::<_, ServiceError>(d)
                })
                .await;
                match result {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(error = %e, "driver generator unavailable, using keyword drivers");
                        fallback_drivers(&question)
                    }
                }
            }
        };
        self.state.set_drivers(drivers);
    }

    fn driver_context(&self) -> DriverContext {
        let mut ranked: Vec<_> = self.state.influence().iter().collect();
        ranked.sort_by(|a, b| b.log_lr.abs().total_cmp(&a.log_lr.abs()));
        let top_claims = ranked
            .into_iter()
            .filter_map(|i| self.state.evidence().get(&i.evidence_id))
            .map(|e| e.claim().to_string())
            .take(DRIVER_CONTEXT_CLAIMS)
            .collect();
        DriverContext {
            market: self.market.clone(),
            p_neutral: self.state.p_neutral(),
            top_claims,
        }
    }

    /// Deterministic report input of a finalized session.
    pub fn report_catalog(&self) -> SessionResult<ReportCatalog> {
        self.require_phase(Phase::Finalized)?;
        Ok(ReportCatalog::build(&self.state, self.cfg.report_top_n))
    }

    /// Narrative report of a finalized session. Falls back to the plain catalog
    /// rendering when the reporter fails.
    pub async fn narrative_report(&self, reporter: &dyn NarrativeReporter) -> SessionResult<String> {
        let catalog = self.report_catalog()?;
        let catalog_ref = &catalog;
        let result = call_with_policy("reporter", self.policy, move || reporter.report(catalog_ref)).await;
        Ok(match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("reporter returned empty text, using catalog rendering");
                catalog.render_markdown()
            }
            Err(e) => {
                warn!(error = %e, "reporter unavailable, using catalog rendering");
                catalog.render_markdown()
            }
        })
    }
}
