use std::collections::HashMap;

use crate::expr::{Expression, Opt};
use crate::ident::Identifier;
use crate::lifespan::Lifespan;
use crate::types::{LocalPath, RemotePath, Uri};

/// `(id, uri, mount-remote-path, ro-bool, optional local-path)`. Immutable
/// once parsed; `uri`'s scheme must be `storage`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub id: Identifier,
    pub uri: Expression<Uri>,
    pub mount: Expression<RemotePath>,
    pub read_only: Expression<bool>,
    pub local: Opt<LocalPath>,
}

/// `(id, ref-uri, optional context, optional dockerfile, build-args, env,
/// preset, force-rebuild)`. If a build is ever performed both `context` and
/// `dockerfile` must be present — checked at build time, not at parse time,
/// since the fields are independently optional in the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: Identifier,
    pub reference: Expression<Uri>,
    pub context: Opt<LocalPath>,
    pub dockerfile: Opt<LocalPath>,
    pub build_args: HashMap<String, Expression<String>>,
    pub env: HashMap<String, Expression<String>>,
    pub build_preset: Opt<String>,
    pub force_rebuild: Expression<bool>,
}

impl Image {
    /// True if both `context` and `dockerfile` are declared, i.e. a build
    /// operation is possible for this image.
    pub fn buildable(&self) -> bool {
        self.context.0.is_some() && self.dockerfile.0.is_some()
    }
}

/// Shared shape of a `Job` and a batch `Task`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecUnit {
    pub id: Identifier,
    pub title: Opt<String>,
    pub name: Opt<String>,
    pub image: Expression<Uri>,
    pub preset: Opt<String>,
    pub entrypoint: Opt<String>,
    pub cmd: Expression<String>,
    pub workdir: Opt<RemotePath>,
    pub env: HashMap<String, Expression<String>>,
    pub volumes: Vec<Identifier>,
    pub tags: Vec<String>,
    pub life_span: Opt<f64>,
    pub http_port: Opt<i64>,
    pub http_auth: Opt<bool>,
    pub schedule_timeout: Opt<f64>,
    pub port_forward: Vec<String>,
    pub pass_config: bool,
}

/// `ExecUnit ⊕ (detach, browse, multi)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub unit: ExecUnit,
    pub detach: bool,
    pub browse: bool,
    pub multi: bool,
}

impl Job {
    pub fn id(&self) -> &Identifier {
        &self.unit.id
    }
}

/// `(tags, env, workdir, life-span)`, merged into each job unless the job
/// sets the same field explicitly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowDefaults {
    pub tags: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<RemotePath>,
    pub life_span: Option<Lifespan>,
}

/// The two supported top-level flow kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Job,
    Batch,
}

/// `(id, kind, title, images, volumes, defaults, jobs)`. For `kind: job`,
/// `jobs` is populated; the batch counterpart's action tree lives in
/// [`crate::batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub id: Identifier,
    pub kind: Kind,
    pub title: Option<String>,
    pub images: HashMap<Identifier, Image>,
    pub volumes: HashMap<Identifier, Volume>,
    pub defaults: FlowDefaults,
    pub jobs: HashMap<Identifier, Job>,
}

impl Flow {
    /// The persistent identity tag set for a given job: `{project:<id>,
    /// job:<j.id>}` union user tags union the flow defaults' tags, with
    /// `multi:<suffix>` appended when the job is a multi-job and a suffix
    /// is known.
    pub fn identity_tags(&self, job: &Job, suffix: Option<&str>) -> Vec<String> {
        let mut tags = vec![
            format!("project:{}", self.id),
            format!("job:{}", job.id()),
        ];
        tags.extend(self.defaults.tags.iter().cloned());
        tags.extend(job.unit.tags.iter().cloned());
        if job.multi {
            if let Some(suffix) = suffix {
                tags.push(format!("multi:{suffix}"));
            }
        }
        let deduped: std::collections::BTreeSet<_> = tags.into_iter().collect();
        deduped.into_iter().collect()
    }
}
