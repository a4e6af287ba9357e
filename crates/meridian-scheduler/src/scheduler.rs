//! The Autonomous Scheduler (spec §4.H2): ticks the job set, fires due jobs
//! at most once concurrently per job, and never backfills missed ticks.

use crate::error::SchedulerResult;
use crate::next_run::next_fire_after;
use chrono::Utc;
use dashmap::DashMap;
use meridian_core::{Job, JobId, JobPayload, JobTarget, MessageRole, SessionKey};
use meridian_events::{Event, EventBus};
use meridian_runtime::AgentRuntime;
use meridian_storage::JobStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Runs the job set to completion of one tick, or forever on an interval.
pub struct Scheduler {
    jobs: Arc<JobStore>,
    events: Arc<EventBus>,
    agent: Arc<AgentRuntime>,
    poll_interval: Duration,
    running: Arc<DashMap<JobId, ()>>,
}

impl Scheduler {
    /// Build a scheduler over `jobs`, dispatching fired jobs through
    /// `agent`, waking every `poll_interval` in [`Scheduler::run_forever`].
    #[must_use]
    pub fn new(jobs: Arc<JobStore>, events: Arc<EventBus>, agent: Arc<AgentRuntime>, poll_interval: Duration) -> Self {
        Self {
            jobs,
            events,
            agent,
            poll_interval,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Run ticks on `poll_interval` until cancelled by dropping the task.
    pub async fn run_forever(&self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "scheduler tick failed");
            }
        }
    }

    /// Recompute due jobs and fire each one that is ready, skipping any job
    /// still mid-run. Returns the ids of jobs fired this tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> SchedulerResult<Vec<JobId>> {
        let now = Utc::now();
        let jobs = self.jobs.list().await?;
        let mut fired = Vec::new();

        for mut job in jobs {
            if !job.enabled {
                continue;
            }
            if self.running.contains_key(&job.id) {
                debug!(job_id = %job.id, "skipping tick; previous run still in flight");
                continue;
            }

            let next_run_at = match job.state.next_run_at {
                Some(t) => t,
                None => match next_fire_after(&job.schedule, now)? {
                    Some(t) => {
                        job.state.next_run_at = Some(t);
                        self.jobs.put(&job).await?;
                        t
                    }
                    None => continue,
                },
            };

            if next_run_at > now {
                continue;
            }

            self.running.insert(job.id, ());
            fired.push(job.id);
            let result = self.fire(job.clone()).await;
            self.running.remove(&job.id);

            let mut updated = job;
            let now_after_run = Utc::now();
            updated.state.last_run_at = Some(now_after_run);
            match &result {
                Ok(()) => {
                    updated.state.last_status = Some("ok".to_string());
                    updated.state.last_error = None;
                }
                Err(e) => {
                    updated.state.last_status = Some("error".to_string());
                    updated.state.last_error = Some(e.to_string());
                    warn!(job_id = %updated.id, error = %e, "scheduled job run failed");
                }
            }
            self.events.publish(Event::JobRunFinished {
                job_id: updated.id,
                status: updated.state.last_status.clone().unwrap_or_default(),
                error: updated.state.last_error.clone(),
            });

            if updated.delete_after_run {
                self.jobs.delete(&updated.id).await?;
                continue;
            }
            updated.state.next_run_at = next_fire_after(&updated.schedule, now_after_run)?;
            self.jobs.put(&updated).await?;
        }

        Ok(fired)
    }

    async fn fire(&self, job: Job) -> SchedulerResult<()> {
        info!(job_id = %job.id, name = %job.name, "firing scheduled job");
        self.events.publish(Event::JobRunStarted { job_id: job.id });

        match &job.payload {
            JobPayload::SystemEvent { text } => {
                self.deliver_system_event(&job.target_session, text).await?;
            }
            JobPayload::AgentTurn {
                prompt,
                model: _,
                deliver,
                channel,
                timeout_s: _,
            } => {
                self.run_agent_turn(&job.target_session, prompt, deliver.as_deref(), channel.as_deref())
                    .await?;
            }
        }
        Ok(())
    }

    async fn deliver_system_event(&self, target: &JobTarget, text: &str) -> SchedulerResult<()> {
        let agent_id = match target {
            JobTarget::Main { agent_id } | JobTarget::Isolated { agent_id } => agent_id.clone(),
        };
        let key = SessionKey::main(agent_id);
        let session = self
            .agent
            .sessions
            .route_or_create(key, None, "scheduler".to_string(), None)
            .await?;
        self.agent
            .sessions
            .append(session.id, MessageRole::System, Value::String(text.to_string()), None, None)
            .await?;
        Ok(())
    }

    async fn run_agent_turn(
        &self,
        target: &JobTarget,
        prompt: &str,
        deliver: Option<&str>,
        _channel: Option<&str>,
    ) -> SchedulerResult<()> {
        match target {
            JobTarget::Main { agent_id } => {
                let main = self
                    .agent
                    .sessions
                    .route_or_create(SessionKey::main(agent_id.clone()), None, "scheduler".to_string(), None)
                    .await?;
                self.agent.run(&main, Some(Value::String(prompt.to_string()))).await?;
            }
            JobTarget::Isolated { agent_id } => {
                let main = self
                    .agent
                    .sessions
                    .route_or_create(SessionKey::main(agent_id.clone()), None, "scheduler".to_string(), None)
                    .await?;
                let subagent = self
                    .agent
                    .sessions
                    .spawn_subagent(&main, format!("job-{}", uuid::Uuid::new_v4()))
                    .await?;
                let result = self.agent.run(&subagent, Some(Value::String(prompt.to_string()))).await?;

                if deliver.is_some() {
                    if let Some(text) = result.final_text {
                        self.agent
                            .sessions
                            .append(main.id, MessageRole::System, Value::String(text), None, None)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_audit::AuditLog;
    use meridian_core::{AgentId, Schedule};
    use meridian_llm::{CredentialPool, EchoProvider};
    use meridian_policy::AccessPolicyEngine;
    use meridian_quota::QuotaManager;
    use meridian_registry::ToolRegistry;
    use meridian_runtime::{DispatchingSandbox, HandlerRegistry, SandboxDriver, SessionManager};
    use meridian_storage::{FileStorage, PolicyStore, SessionStore};
    use meridian_workspace::{WorkspaceBoundary, WorkspaceConfig};
    use std::time::Duration as StdDuration;

    async fn fixture() -> (Scheduler, Arc<JobStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path());
        let jobs = Arc::new(JobStore::open(&backend).await.unwrap());
        let events = Arc::new(EventBus::new(16));

        let store = Arc::new(SessionStore::open(dir.path()).await.unwrap());
        let sessions = Arc::new(SessionManager::new(store, events.clone(), 1_000_000, 4));
        let registry = Arc::new(ToolRegistry::builtin());
        let boundary = WorkspaceBoundary::new(WorkspaceConfig::new(dir.path().to_path_buf()));
        let handlers = Arc::new(HandlerRegistry::builtin(boundary));
        let sandbox: Arc<dyn SandboxDriver> = Arc::new(DispatchingSandbox::new(None));
        let policy_store = PolicyStore::open(&backend).await.unwrap();
        let access_policy = Arc::new(AccessPolicyEngine::new(policy_store, StdDuration::from_secs(5)).await.unwrap());
        let quota = Arc::new(QuotaManager::new(StdDuration::from_millis(100)));
        let audit = Arc::new(AuditLog::open(dir.path()).await.unwrap());

        let agent = Arc::new(AgentRuntime {
            sessions,
            registry,
            handlers,
            sandbox,
            access_policy,
            quota,
            llm: Arc::new(EchoProvider),
            credentials: Arc::new(CredentialPool::new()),
            events: events.clone(),
            audit,
            max_iterations: 5,
            turn_deadline: StdDuration::from_secs(5),
            tool_timeout: StdDuration::from_secs(1),
            model: "echo-1".to_string(),
        });

        let scheduler = Scheduler::new(jobs.clone(), events, agent, StdDuration::from_millis(10));
        (scheduler, jobs, dir)
    }

    fn due_job(name: &str) -> Job {
        Job {
            id: meridian_core::JobId::new(),
            name: name.to_string(),
            schedule: Schedule::At {
                timestamp: Utc::now() - chrono::Duration::seconds(1),
            },
            payload: JobPayload::SystemEvent {
                text: "tick".to_string(),
            },
            target_session: JobTarget::Main {
                agent_id: AgentId::new("a1"),
            },
            enabled: true,
            delete_after_run: true,
            state: Default::default(),
        }
    }

    #[tokio::test]
    async fn an_at_job_fires_at_most_once() {
        let (scheduler, jobs, _dir) = fixture().await;
        let job = due_job("once");
        jobs.put(&job).await.unwrap();

        let fired = scheduler.tick().await.unwrap();
        assert_eq!(fired, vec![job.id]);

        // delete_after_run removed it; a second tick fires nothing.
        let fired_again = scheduler.tick().await.unwrap();
        assert!(fired_again.is_empty());
        assert!(jobs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_jobs_never_fire() {
        let (scheduler, jobs, _dir) = fixture().await;
        let mut job = due_job("disabled");
        job.enabled = false;
        jobs.put(&job).await.unwrap();

        let fired = scheduler.tick().await.unwrap();
        assert!(fired.is_empty());
    }

    #[tokio::test]
    async fn recurring_jobs_survive_with_a_fresh_next_run_at() {
        let (scheduler, jobs, _dir) = fixture().await;
        let mut job = due_job("recurring");
        job.delete_after_run = false;
        job.schedule = Schedule::Every {
            period_s: 60,
            anchor: None,
        };
        jobs.put(&job).await.unwrap();

        scheduler.tick().await.unwrap();
        let remaining = jobs.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].state.next_run_at.is_some());
    }
}
