use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use flowctl_core::ast::{Flow, Job};
use flowctl_core::expr::Expression;
use flowctl_core::ident::Identifier;
use flowctl_core::job_info::{JobInfo, JobStatus};
use flowctl_core::scope::{Scope, Value};

use crate::error::{Result, RunnerError};
use crate::remote::{CliRunner, ListQuery, ProjectStorage, RoleManager, RemoteJobs, LiveJobRecord};
use crate::tags;

const KILL_POLL_INTERVAL_MS: u64 = 200;
const DISCOVERY_SINCE_DAYS: i64 = 7;
const MAX_NAME_LEN: usize = 40;

/// Outcome of the attach-vs-restart decision in [`JobController::run`].
enum AttachOutcome {
    Attached(JobInfo),
    FallThrough,
}

/// The live job controller: the only component that speaks to the remote
/// job service. Holds a shared reference to the flow and to its external
/// collaborators for its lifetime.
pub struct JobController {
    flow: Flow,
    remote: Arc<dyn RemoteJobs>,
    cli: Arc<dyn CliRunner>,
    storage: Arc<dyn ProjectStorage>,
    roles: Arc<dyn RoleManager>,
    project_role: Option<String>,
    role_created: AtomicBool,
}

impl JobController {
    pub fn new(
        flow: Flow,
        remote: Arc<dyn RemoteJobs>,
        cli: Arc<dyn CliRunner>,
        storage: Arc<dyn ProjectStorage>,
        roles: Arc<dyn RoleManager>,
        project_role: Option<String>,
    ) -> Self {
        Self {
            flow,
            remote,
            cli,
            storage,
            roles,
            project_role,
            role_created: AtomicBool::new(false),
        }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// `_ensure_meta`: looks up a job by id and checks suffix usage against
    /// its multi-ness.
    fn ensure_meta(
        &self,
        job_id: &Identifier,
        suffix: Option<&str>,
        skip_check: bool,
    ) -> Result<&Job> {
        let job = self.flow.jobs.get(job_id).ok_or_else(|| {
            let mut ids: Vec<&str> = self.flow.jobs.keys().map(|k| k.as_str()).collect();
            ids.sort_unstable();
            RunnerError::NotFound(format!(
                "unknown job '{job_id}', available: {}",
                ids.join(", ")
            ))
        })?;

        if job.multi && suffix.is_none() && !skip_check {
            return Err(RunnerError::ArgumentMisuse(format!(
                "job '{job_id}' is multi; a suffix is required"
            )));
        }
        if !job.multi && suffix.is_some() {
            return Err(RunnerError::ArgumentMisuse(format!(
                "job '{job_id}' is not multi; a suffix cannot be given"
            )));
        }
        Ok(job)
    }

    /// `resolve_jobs`: the two-query discovery protocol from the source.
    async fn resolve_jobs(&self, job: &Job, suffix: Option<&str>) -> Result<Vec<JobInfo>> {
        let tags = self.flow.identity_tags(job, suffix);

        let live_query = ListQuery {
            statuses: JobStatus::LIVE.to_vec(),
            tags: tags.clone(),
            since: None,
            reverse_chronological: true,
        };
        let live = self.remote.list(&live_query).await?;

        if job.multi && suffix.is_none() {
            // Branch A: fully consume both queries.
            tracing::debug!(job = %job.id(), "discovery: multi-job without suffix, consuming both queries");
            let since = Utc::now() - ChronoDuration::days(DISCOVERY_SINCE_DAYS);
            let terminated_query = ListQuery {
                statuses: JobStatus::TERMINATED.to_vec(),
                tags,
                since: Some(since),
                reverse_chronological: true,
            };
            let terminated = self.remote.list(&terminated_query).await?;
            let mut combined = live;
            combined.extend(terminated);
            return Ok(dedup_multi_instances(job, combined));
        }

        // Branch B: at most one result; short-circuit on a first-query hit.
        if let Some(first) = live.into_iter().next() {
            tracing::debug!(job = %job.id(), "discovery: hit on first (live) query");
            return Ok(vec![classify(job, first)]);
        }
        let since = Utc::now() - ChronoDuration::days(DISCOVERY_SINCE_DAYS);
        let terminated_query = ListQuery {
            statuses: JobStatus::TERMINATED.to_vec(),
            tags,
            since: Some(since),
            reverse_chronological: true,
        };
        let terminated = self.remote.list(&terminated_query).await?;
        Ok(terminated
            .into_iter()
            .next()
            .map(|i| classify(job, i))
            .into_iter()
            .collect())
    }

    /// Enumerates every `multi:<v>` suffix seen across live and terminated
    /// instances of a multi-job, without targeting any particular one.
    pub async fn list_suffixes(&self, job_id: &Identifier) -> Result<Vec<String>> {
        let job = self.ensure_meta(job_id, None, true)?.clone();
        let instances = self.resolve_jobs(&job, None).await?;
        Ok(instances
            .iter()
            .filter_map(|i| i.tag_value("multi").map(str::to_string))
            .collect())
    }

    /// `status(job_id, suffix)`.
    pub async fn status(&self, job_id: &Identifier, suffix: Option<&str>) -> Result<JobInfo> {
        let job = self.ensure_meta(job_id, suffix, false)?.clone();
        let mut instances = self.resolve_jobs(&job, suffix).await?;
        instances
            .pop()
            .ok_or_else(|| RunnerError::NotFound(format!("job '{job_id}' is not running")))
    }

    /// `logs(job_id, suffix)`.
    pub async fn logs(&self, job_id: &Identifier, suffix: Option<&str>) -> Result<String> {
        let info = self.status(job_id, suffix).await?;
        self.cli
            .capture(&["logs".to_string(), info.remote_id.clone()])
            .await
    }

    /// `ps()`: fans out one concurrent status-fetch per declared job id and
    /// joins preserving declaration order.
    pub async fn ps(&self) -> Vec<(Identifier, Result<JobInfo>)> {
        let mut ids: Vec<Identifier> = self.flow.jobs.keys().cloned().collect();
        ids.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));

        let futures = ids.iter().cloned().map(|id| {
            let id_for_call = id.clone();
            async move { (id, self.status(&id_for_call, None).await) }
        });
        futures::future::join_all(futures).await
    }

    async fn try_attach_to_running(
        &self,
        job: &Job,
        suffix: Option<&str>,
        args: &[String],
    ) -> Result<AttachOutcome> {
        let mut instances = self.resolve_jobs(job, suffix).await?;
        let info = match instances.pop() {
            Some(info) if instances.is_empty() => info,
            _ => return Ok(AttachOutcome::FallThrough),
        };

        match info.status {
            JobStatus::Running => {
                tracing::info!(job = %job.id(), remote_id = %info.remote_id, "attaching to running instance");
                if job.multi && suffix.is_some() && !args.is_empty() {
                    return Err(RunnerError::ArgumentMisuse(
                        "extra arguments are not allowed against an already-running suffix"
                            .to_string(),
                    ));
                }
                if job.browse {
                    self.cli
                        .exec(&["browse".to_string(), info.remote_id.clone()])
                        .await?;
                }
                if !job.detach {
                    self.cli
                        .exec(&["attach".to_string(), info.remote_id.clone()])
                        .await?;
                }
                Ok(AttachOutcome::Attached(info))
            }
            JobStatus::Pending => Err(RunnerError::ArgumentMisuse(format!(
                "job '{}' is pending",
                job.id()
            ))),
            s if s.is_terminated() => {
                tracing::info!(job = %job.id(), status = ?s, "prior instance terminated, restarting");
                Ok(AttachOutcome::FallThrough)
            }
            _ => Ok(AttachOutcome::FallThrough),
        }
    }

    /// `run(J, suffix?, args?, params)`.
    pub async fn run(
        &self,
        job_id: &Identifier,
        suffix: Option<&str>,
        args: Vec<String>,
    ) -> Result<JobInfo> {
        let job = self.ensure_meta(job_id, suffix, true)?.clone();

        if !job.multi && !args.is_empty() {
            return Err(RunnerError::ArgumentMisuse(format!(
                "job '{job_id}' is not multi; does not accept extra arguments"
            )));
        }

        if !job.multi || suffix.is_some() {
            match self.try_attach_to_running(&job, suffix, &args).await? {
                AttachOutcome::Attached(info) => return Ok(info),
                AttachOutcome::FallThrough => {}
            }
        }

        let resolved_suffix = if job.multi {
            Some(suffix.map(str::to_string).unwrap_or_else(tags::generate_suffix))
        } else {
            None
        };

        for (id, j) in &self.flow.jobs {
            let record_suffix = if id == job.id() {
                resolved_suffix.as_deref()
            } else {
                None
            };
            self.storage
                .save_live_job(LiveJobRecord {
                    multi: j.multi,
                    yaml_id: id.to_string(),
                    tags: self.flow.identity_tags(j, record_suffix),
                })
                .await?;
        }

        let mut argv = self.build_run_argv(&job, resolved_suffix.as_deref(), &args)?;

        if let Some(role) = self.project_role.clone() {
            self.ensure_project_role(&role).await?;
            argv.push(format!("--share={role}"));
        }

        self.cli.exec(&argv).await?;

        if let Some(role) = self.project_role.clone() {
            for volume_id in &job.unit.volumes {
                if let Some(volume) = self.flow.volumes.get(volume_id) {
                    if let Expression::Literal(uri) = &volume.uri {
                        self.roles.share(uri.as_str(), &role).await?;
                    }
                }
            }
        }

        // The CLI invocation above starts the remote instance but doesn't
        // itself return a JobInfo; re-run discovery to pick up what was
        // just created (or attached to, for a `--detach` launch).
        let mut instances = self.resolve_jobs(&job, resolved_suffix.as_deref()).await?;
        instances.pop().ok_or_else(|| {
            RunnerError::NotFound(format!(
                "job '{}' did not appear in discovery after run",
                job.id()
            ))
        })
    }

    async fn ensure_project_role(&self, role: &str) -> Result<()> {
        if self.role_created.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.roles.create_project_role(role).await {
            Ok(()) => {
                tracing::info!(role, "project role created");
                self.role_created.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) if e.is_swallowable_role_error() => {
                tracing::debug!(role, error = %e, "project role creation swallowed");
                self.role_created.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `kill(J, suffix?)`.
    pub async fn kill(&self, job_id: &Identifier, suffix: Option<&str>) -> Result<()> {
        let job = self.ensure_meta(job_id, suffix, false)?.clone();
        let instances = self.resolve_jobs(&job, suffix).await?;
        for info in instances {
            if !info.status.is_running() && info.status != JobStatus::Pending {
                continue;
            }
            self.remote.kill(&info.remote_id).await?;
            self.poll_until_terminated(&info.remote_id).await;
        }
        Ok(())
    }

    async fn poll_until_terminated(&self, remote_id: &str) {
        loop {
            match self.remote.status(remote_id).await {
                Ok(info) if info.status.is_terminated() => {
                    tracing::debug!(remote_id, status = ?info.status, "kill poll: terminated");
                    return;
                }
                Ok(_) => {}
                Err(RunnerError::NotFound(_)) => {
                    tracing::debug!(remote_id, "kill poll: instance no longer found");
                    return;
                }
                Err(_) => return,
            }
            tokio::time::sleep(std::time::Duration::from_millis(KILL_POLL_INTERVAL_MS)).await;
        }
    }

    /// `kill_all`: kills every running job carrying the flow's shared tags,
    /// one concurrent task per discovered instance, reporting in
    /// completion order.
    pub async fn kill_all(&self) -> Result<Vec<(String, Option<String>)>> {
        let tags = vec![format!("project:{}", self.flow.id)];
        let query = ListQuery {
            statuses: vec![JobStatus::Running],
            tags,
            since: None,
            reverse_chronological: true,
        };
        let instances = self.remote.list(&query).await?;

        let futures = instances.into_iter().map(|info| async move {
            let logical = info.tag_value("job").unwrap_or("?").to_string();
            let suffix = info.tag_value("multi").map(str::to_string);
            self.remote.kill(&info.remote_id).await.ok();
            self.poll_until_terminated(&info.remote_id).await;
            (logical, suffix)
        });
        Ok(futures::future::join_all(futures).await)
    }

    fn build_run_argv(
        &self,
        job: &Job,
        suffix: Option<&str>,
        extra_args: &[String],
    ) -> Result<Vec<String>> {
        let scope = self.scope();
        let mut argv = vec!["run".to_string()];

        if let Some(title) = job.unit.title.eval(&scope)? {
            argv.push(format!("--description={title}"));
        }
        argv.push(format!("--name={}", self.derive_name(job, suffix)?));
        if let Some(preset) = job.unit.preset.eval(&scope)? {
            argv.push(format!("--preset={preset}"));
        }
        if let Some(timeout) = job.unit.schedule_timeout.eval(&scope)? {
            argv.push(format!("--schedule-timeout={}s", timeout as i64));
        }
        if let Some(port) = job.unit.http_port.eval(&scope)? {
            argv.push(format!("--http={port}"));
        }
        if let Some(auth) = job.unit.http_auth.eval(&scope)? {
            argv.push(if auth { "--http-auth" } else { "--no-http-auth" }.to_string());
        }
        if let Some(entrypoint) = job.unit.entrypoint.eval(&scope)? {
            argv.push(format!("--entrypoint={entrypoint}"));
        }
        if let Some(workdir) = job.unit.workdir.eval(&scope)? {
            argv.push(format!("--workdir={workdir}"));
        }
        for (k, v) in &job.unit.env {
            argv.push(format!("--env={k}={}", v.eval(&scope)?));
        }
        for volume_id in &job.unit.volumes {
            if let Some(volume) = self.flow.volumes.get(volume_id) {
                argv.push(format!("--volume={}", render_volume(volume, &scope)?));
            }
        }
        for tag in &job.unit.tags {
            argv.push(format!("--tag={tag}"));
        }
        if let Some(life_span) = job.unit.life_span.eval(&scope)? {
            argv.push(format!("--life-span={}s", life_span as i64));
        }
        if job.browse {
            argv.push("--browse".to_string());
        }
        if job.detach {
            argv.push("--detach".to_string());
        }
        for pf in &job.unit.port_forward {
            argv.push(format!("--port-forward={pf}"));
        }
        if job.unit.pass_config {
            argv.push("--pass-config".to_string());
        }

        let image = job.unit.image.eval(&scope)?;
        argv.push(image.as_str().to_string());
        argv.push("--".to_string());
        let cmd = job.unit.cmd.eval(&scope)?;
        argv.extend(cmd.split_whitespace().map(str::to_string));
        if job.multi {
            argv.extend(extra_args.iter().cloned());
        }

        Ok(argv)
    }

    /// Name derivation per the truncation-to-40-chars rule.
    fn derive_name(&self, job: &Job, suffix: Option<&str>) -> Result<String> {
        let scope = self.scope();
        if let Some(explicit) = job.unit.name.eval(&scope)? {
            return Ok(explicit);
        }

        let mut second = job.id().to_string();
        if job.multi {
            if let Some(s) = suffix {
                second.push('-');
                second.push_str(s);
            }
        }
        let second = normalize_name_component(&second);

        let mut first = normalize_name_component(self.flow.id.as_str());
        let budget = MAX_NAME_LEN.saturating_sub(second.len() + 1);
        if first.len() > budget {
            first.truncate(budget);
        }

        Ok(collapse_dashes(&format!("{first}-{second}")))
    }

    fn scope(&self) -> Scope {
        let mut flow_fields = HashMap::new();
        flow_fields.insert("id".to_string(), Value::Str(self.flow.id.to_string()));
        let mut env = HashMap::new();
        for (k, v) in &self.flow.defaults.env {
            env.insert(k.clone(), Value::Str(v.clone()));
        }
        flow_fields.insert("env".to_string(), Value::Map(env));
        Scope::root().bind("flow", Value::Map(flow_fields))
    }
}

fn render_volume(volume: &flowctl_core::ast::Volume, scope: &Scope) -> Result<String> {
    let uri = volume.uri.eval(scope)?;
    let mount = volume.mount.eval(scope)?;
    let ro = volume.read_only.eval(scope)?;
    Ok(if ro {
        format!("{uri}:{mount}:ro")
    } else {
        format!("{uri}:{mount}")
    })
}

fn classify(job: &Job, mut info: JobInfo) -> JobInfo {
    if job.multi {
        if let Some(v) = info.tag_value("multi") {
            info.id = format!("{} {}", job.id(), v);
            return info;
        }
    }
    info.id = job.id().to_string();
    info
}

/// De-duplicates multi-instances across the live and terminated query
/// results by their `multi:<v>` suffix, stopping as soon as a suffix
/// already seen recurs.
fn dedup_multi_instances(job: &Job, instances: Vec<JobInfo>) -> Vec<JobInfo> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in instances {
        let info = classify(job, raw);
        let suffix = info.tag_value("multi").map(str::to_string);
        if let Some(ref s) = suffix {
            if !seen.insert(s.clone()) {
                break;
            }
        }
        out.push(info);
    }
    out
}

fn normalize_name_component(s: &str) -> String {
    let replaced = s.replace('_', "-");
    let collapsed = collapse_dashes(&replaced);
    collapsed.trim_matches('-').to_string()
}

fn collapse_dashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = false;
    for c in s.chars() {
        if c == '-' {
            if !prev_dash {
                out.push('-');
            }
            prev_dash = true;
        } else {
            out.push(c);
            prev_dash = false;
        }
    }
    out
}
