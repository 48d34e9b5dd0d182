use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ast::{ExecUnit, Flow, FlowDefaults, Image, Job, Kind, Volume};
use crate::error::{FlowError, Result};
use crate::expr::{Expression, Opt};
use crate::ident::Identifier;
use crate::lifespan::Lifespan;
use crate::types::{LocalPath, RemotePath, Uri};

const MARKER_DIR: &str = ".flowctl";
const JOBS_FILE: &str = "jobs.yml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFlow {
    kind: String,
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    images: HashMap<String, RawImage>,
    #[serde(default)]
    volumes: HashMap<String, RawVolume>,
    #[serde(default)]
    defaults: RawDefaults,
    #[serde(default)]
    jobs: HashMap<String, RawJob>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawImage {
    uri: String,
    context: Option<String>,
    dockerfile: Option<String>,
    #[serde(rename = "build-args", default)]
    build_args: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVolume {
    uri: String,
    mount: String,
    #[serde(default)]
    ro: bool,
    local: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawDefaults {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    workdir: Option<String>,
    #[serde(rename = "life-span")]
    life_span: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJob {
    title: Option<String>,
    name: Option<String>,
    image: String,
    preset: Option<String>,
    entrypoint: Option<String>,
    cmd: String,
    workdir: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "life-span")]
    life_span: Option<String>,
    #[serde(rename = "http-port")]
    http_port: Option<i64>,
    #[serde(rename = "http-auth", default = "default_true")]
    http_auth: bool,
    #[serde(default)]
    detach: bool,
    #[serde(default)]
    browse: bool,
    #[serde(default)]
    multi: bool,
}

fn default_true() -> bool {
    true
}

/// Parses and validates an interactive (`kind: job`) flow document. `path`,
/// when given, is used for default-id derivation and is not otherwise
/// required for parsing.
pub fn parse(yaml: &str, path: Option<&Path>) -> Result<Flow> {
    let raw: RawFlow = serde_yaml::from_str(yaml)?;

    if raw.kind != "job" {
        return Err(FlowError::SchemaError(format!(
            "unsupported kind '{}', only 'job' is supported",
            raw.kind
        )));
    }

    let id = match raw.id {
        Some(id) => Identifier::new(id)?,
        None => {
            let derived = path
                .map(default_interactive_id)
                .ok_or_else(|| {
                    FlowError::SchemaError(
                        "flow id omitted and no source path available to derive one".into(),
                    )
                })?;
            Identifier::new(derived)?
        }
    };

    let images = raw
        .images
        .into_iter()
        .map(|(k, v)| -> Result<(Identifier, Image)> {
            let id = Identifier::new(k)?;
            Ok((id.clone(), convert_image(id, v)?))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    let volumes = raw
        .volumes
        .into_iter()
        .map(|(k, v)| -> Result<(Identifier, Volume)> {
            let id = Identifier::new(k)?;
            Ok((id.clone(), convert_volume(id, v)?))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    let defaults = convert_defaults(raw.defaults)?;

    let jobs = raw
        .jobs
        .into_iter()
        .map(|(k, v)| -> Result<(Identifier, Job)> {
            let id = Identifier::new(k)?;
            Ok((id.clone(), convert_job(id, v)?))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    Ok(Flow {
        id,
        kind: Kind::Job,
        title: raw.title,
        images,
        volumes,
        defaults,
        jobs,
    })
}

fn convert_image(id: Identifier, raw: RawImage) -> Result<Image> {
    Ok(Image {
        id,
        reference: Expression::<Uri>::parse(&raw.uri)?,
        context: Opt::<LocalPath>::parse(raw.context.as_deref())?,
        dockerfile: Opt::<LocalPath>::parse(raw.dockerfile.as_deref())?,
        build_args: raw
            .build_args
            .into_iter()
            .map(|(k, v)| Ok((k, Expression::<String>::parse(&v)?)))
            .collect::<Result<HashMap<_, _>>>()?,
        env: HashMap::new(),
        build_preset: Opt::absent(),
        force_rebuild: Expression::literal(false),
    })
}

fn convert_volume(id: Identifier, raw: RawVolume) -> Result<Volume> {
    let uri = Expression::<Uri>::parse(&raw.uri)?;
    if let Expression::Literal(ref u) = uri {
        if u.scheme() != "storage" {
            return Err(FlowError::SchemaError(format!(
                "volume '{id}' uri scheme must be 'storage', got '{}'",
                u.scheme()
            )));
        }
    }
    Ok(Volume {
        id,
        uri,
        mount: Expression::<RemotePath>::parse(&raw.mount)?,
        read_only: Expression::literal(raw.ro),
        local: Opt::parse(raw.local.as_deref())?,
    })
}

fn convert_defaults(raw: RawDefaults) -> Result<FlowDefaults> {
    Ok(FlowDefaults {
        tags: dedup_tags(raw.tags),
        env: raw.env,
        workdir: raw.workdir.map(|s| RemotePath::parse(&s)).transpose()?,
        life_span: raw.life_span.map(|s| Lifespan::parse(&s)).transpose()?,
    })
}

fn convert_job(id: Identifier, raw: RawJob) -> Result<Job> {
    let volumes = raw
        .volumes
        .into_iter()
        .map(Identifier::new)
        .collect::<Result<Vec<_>>>()?;

    let life_span = match raw.life_span {
        Some(s) => Some(Lifespan::parse(&s)?.seconds()),
        None => None,
    };

    let unit = ExecUnit {
        id,
        title: Opt::parse(raw.title.as_deref())?,
        name: Opt::parse(raw.name.as_deref())?,
        image: Expression::<Uri>::parse(&raw.image)?,
        preset: Opt::parse(raw.preset.as_deref())?,
        entrypoint: Opt::parse(raw.entrypoint.as_deref())?,
        cmd: Expression::<String>::parse(&raw.cmd)?,
        workdir: Opt::parse(raw.workdir.as_deref())?,
        env: raw
            .env
            .into_iter()
            .map(|(k, v)| Ok((k, Expression::<String>::parse(&v)?)))
            .collect::<Result<HashMap<_, _>>>()?,
        volumes,
        tags: dedup_tags(raw.tags),
        life_span: Opt(life_span.map(Expression::literal)),
        http_port: Opt(raw.http_port.map(Expression::literal)),
        http_auth: Opt(Some(Expression::literal(raw.http_auth))),
        schedule_timeout: Opt::absent(),
        port_forward: Vec::new(),
        pass_config: false,
    };

    Ok(Job {
        unit,
        detach: raw.detach,
        browse: raw.browse,
        multi: raw.multi,
    })
}

/// Deduplicates a tag list while treating it as a semantic set; duplicates
/// in the YAML source are permitted but collapsed here.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for t in tags {
        seen.insert(t);
    }
    seen.into_iter().collect()
}

/// Derives the default flow id for an interactive flow from its source
/// path: if the path ends with `.flowctl/jobs.yml`, the parent directory of
/// `.flowctl`; otherwise the file's stem.
fn default_interactive_id(path: &Path) -> String {
    if path.file_name().and_then(|f| f.to_str()) == Some(JOBS_FILE) {
        if let Some(parent) = path.parent() {
            if parent.file_name().and_then(|f| f.to_str()) == Some(MARKER_DIR) {
                if let Some(project_dir) = parent.parent() {
                    if let Some(name) = project_dir.file_name().and_then(|f| f.to_str()) {
                        return name.to_string();
                    }
                }
            }
        }
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flow")
        .to_string()
}

/// Walks upward from `start` looking for a `.flowctl` marker directory
/// containing `jobs.yml`, returning the path to that file.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(MARKER_DIR).join(JOBS_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
kind: job
id: data_pipeline
jobs:
  train:
    image: image:banana1
    cmd: python train.py
"#;

    #[test]
    fn parses_minimal_flow() {
        let flow = parse(MINIMAL, None).unwrap();
        assert_eq!(flow.id.as_str(), "data_pipeline");
        assert_eq!(flow.jobs.len(), 1);
        let job = flow.jobs.get(&Identifier::new("train").unwrap()).unwrap();
        assert!(!job.detach);
        assert!(!job.browse);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let yaml = "kind: job\njobs: {}\nbogus: 1\n";
        assert!(parse(yaml, None).is_err());
    }

    #[test]
    fn rejects_missing_kind() {
        let yaml = "jobs: {}\n";
        assert!(parse(yaml, None).is_err());
    }

    #[test]
    fn rejects_unsupported_kind() {
        let yaml = "kind: batch\njobs: {}\n";
        assert!(parse(yaml, None).is_err());
    }

    #[test]
    fn derives_id_from_flowctl_jobs_path() {
        let path = Path::new("/home/user/my-project/.flowctl/jobs.yml");
        assert_eq!(default_interactive_id(path), "my-project");
    }

    #[test]
    fn derives_id_from_file_stem_otherwise() {
        let path = Path::new("/home/user/flows/build.yml");
        assert_eq!(default_interactive_id(path), "build");
    }

    #[test]
    fn dedups_tags() {
        let yaml = r#"
kind: job
id: x
defaults:
  tags: ["a", "b", "a"]
jobs:
  train:
    image: image:banana1
    cmd: echo hi
"#;
        let flow = parse(yaml, None).unwrap();
        assert_eq!(flow.defaults.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn parses_multi_flag_and_local_volume_path() {
        let yaml = r#"
kind: job
id: x
volumes:
  data:
    uri: "storage:/proj/data"
    mount: "/mnt/data"
    local: "./data"
jobs:
  train:
    image: image:banana1
    cmd: echo hi
    multi: true
    volumes: [data]
"#;
        let flow = parse(yaml, None).unwrap();
        let job = flow.jobs.get(&Identifier::new("train").unwrap()).unwrap();
        assert!(job.multi);
        let volume = flow.volumes.get(&Identifier::new("data").unwrap()).unwrap();
        assert!(volume.local.0.is_some());
    }

    #[test]
    fn find_config_walks_upward() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join(MARKER_DIR);
        std::fs::create_dir_all(&marker).unwrap();
        std::fs::write(marker.join(JOBS_FILE), MINIMAL).unwrap();

        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, marker.join(JOBS_FILE));
    }
}
