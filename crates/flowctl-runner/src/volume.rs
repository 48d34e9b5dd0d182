use std::collections::HashMap;
use std::sync::Arc;

use flowctl_core::ast::{Flow, Image, Volume};
use flowctl_core::scope::{Scope, Value};

use crate::error::{Result, RunnerError};
use crate::remote::{CliRunner, RoleManager};

/// `upload`/`download`/`clean`/`mkvolumes`/`build` shell out to a
/// non-interactive command, unlike `run`/`attach`/`browse`, whose exit code
/// belongs to the attached job rather than to the operation itself. These
/// callers need the failure surfaced rather than silently ignored.
async fn exec_checked(cli: &dyn CliRunner, argv: &[String]) -> Result<()> {
    let status = cli.exec(argv).await?;
    if !status.success() {
        return Err(RunnerError::CommandFailed {
            argv: argv.join(" "),
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Drives the volume/image subsystem: local↔remote filesystem sync, remote
/// directory setup, and image builds. All operations go through the
/// sub-process `CliRunner` — there is no direct remote API surface for
/// file transfer.
pub struct VolumeDriver {
    cli: Arc<dyn CliRunner>,
    roles: Arc<dyn RoleManager>,
    project_role: Option<String>,
}

impl VolumeDriver {
    pub fn new(
        cli: Arc<dyn CliRunner>,
        roles: Arc<dyn RoleManager>,
        project_role: Option<String>,
    ) -> Self {
        Self {
            cli,
            roles,
            project_role,
        }
    }

    /// `mkdir --parents` the remote parent, then a recursive, update-only,
    /// no-target-directory copy from the volume's local side to its remote
    /// URI, then share the normalized storage URI with the project role.
    pub async fn upload(&self, volume: &Volume, scope: &Scope) -> Result<()> {
        let local = self.require_local(volume, scope)?;
        let remote = volume.uri.eval(scope)?;
        let parent = remote_parent(remote.as_str());

        exec_checked(self.cli.as_ref(), &to_argv(["mkdir", "--parents", parent.as_str()])).await?;
        exec_checked(
            self.cli.as_ref(),
            &to_argv([
                "cp",
                "--recursive",
                "--update",
                "--no-target-directory",
                local.as_str(),
                remote.as_str(),
            ]),
        )
        .await?;
        self.share(remote.as_str()).await
    }

    /// The reverse of `upload`: same flags, remote → local.
    pub async fn download(&self, volume: &Volume, scope: &Scope) -> Result<()> {
        let local = self.require_local(volume, scope)?;
        let remote = volume.uri.eval(scope)?;

        exec_checked(
            self.cli.as_ref(),
            &to_argv([
                "cp",
                "--recursive",
                "--update",
                "--no-target-directory",
                remote.as_str(),
                local.as_str(),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Recursive remove of the volume's remote location.
    pub async fn clean(&self, volume: &Volume, scope: &Scope) -> Result<()> {
        let remote = volume.uri.eval(scope)?;
        exec_checked(self.cli.as_ref(), &to_argv(["rm", "--recursive", remote.as_str()])).await?;
        Ok(())
    }

    /// `mkdir --parents` the remote URI itself (not its parent) for every
    /// volume declaring a local side, then shares it.
    pub async fn mkvolumes(&self, flow: &Flow, scope: &Scope) -> Result<()> {
        for volume in with_local_side(flow) {
            let remote = volume.uri.eval(scope)?;
            exec_checked(self.cli.as_ref(), &to_argv(["mkdir", "--parents", remote.as_str()]))
                .await?;
            self.share(remote.as_str()).await?;
        }
        Ok(())
    }

    /// Assembles a build-CLI argument list from the image's metadata and
    /// runs it; after a successful build, shares the image ref with its
    /// tag stripped.
    pub async fn build(&self, image: &Image, force: bool, scope: &Scope) -> Result<()> {
        if !image.buildable() {
            return Err(RunnerError::MissingDockerfile(image.id.to_string()));
        }
        let dockerfile = image
            .dockerfile
            .eval(scope)?
            .expect("buildable() guarantees dockerfile is present");
        let context = image
            .context
            .eval(scope)?
            .expect("buildable() guarantees context is present");
        let reference = image.reference.eval(scope)?;

        let mut argv = vec!["build".to_string(), "--file".to_string(), dockerfile.to_string()];
        for (key, value) in &image.build_args {
            argv.push("--build-arg".to_string());
            argv.push(format!("{key}={}", value.eval(scope)?));
        }
        for (key, value) in &image.env {
            argv.push("--env".to_string());
            argv.push(format!("{key}={}", value.eval(scope)?));
        }
        if let Some(preset) = image.build_preset.eval(scope)? {
            argv.push("--preset".to_string());
            argv.push(preset);
        }
        if force || image.force_rebuild.eval(scope)? {
            argv.push("--force-overwrite".to_string());
        }
        argv.push(context.to_string());
        argv.push(reference.to_string());

        exec_checked(self.cli.as_ref(), &argv).await?;
        self.share(strip_tag(reference.as_str())).await
    }

    pub async fn upload_all(&self, flow: &Flow, scope: &Scope) -> Result<()> {
        for volume in with_local_side(flow) {
            self.upload(volume, scope).await?;
        }
        Ok(())
    }

    pub async fn download_all(&self, flow: &Flow, scope: &Scope) -> Result<()> {
        for volume in with_local_side(flow) {
            self.download(volume, scope).await?;
        }
        Ok(())
    }

    pub async fn clean_all(&self, flow: &Flow, scope: &Scope) -> Result<()> {
        for volume in with_local_side(flow) {
            self.clean(volume, scope).await?;
        }
        Ok(())
    }

    pub async fn build_all(&self, flow: &Flow, force: bool, scope: &Scope) -> Result<()> {
        for image in flow.images.values().filter(|i| i.buildable()) {
            self.build(image, force, scope).await?;
        }
        Ok(())
    }

    fn require_local(&self, volume: &Volume, scope: &Scope) -> Result<String> {
        volume
            .local
            .eval(scope)?
            .map(|p| p.to_string())
            .ok_or_else(|| {
                RunnerError::ArgumentMisuse(format!(
                    "volume '{}' has no local path to transfer",
                    volume.id
                ))
            })
    }

    async fn share(&self, uri: &str) -> Result<()> {
        if let Some(role) = &self.project_role {
            self.roles.share(uri, role).await?;
        }
        Ok(())
    }
}

fn with_local_side(flow: &Flow) -> impl Iterator<Item = &Volume> {
    flow.volumes.values().filter(|v| v.local.0.is_some())
}

fn remote_parent(uri: &str) -> String {
    match uri.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => uri.to_string(),
    }
}

fn strip_tag(reference: &str) -> &str {
    if reference.splitn(3, ':').count() == 3 {
        let tag_start = reference.rfind(':').expect("count() == 3 implies a ':' exists");
        &reference[..tag_start]
    } else {
        reference
    }
}

fn to_argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// A minimal evaluation scope exposing only `flow.id` and `flow.env` — the
/// same shape the job controller builds, but volume/image operations don't
/// need the job-level frame.
pub fn flow_scope(flow: &Flow) -> Scope {
    let mut flow_fields = HashMap::new();
    flow_fields.insert("id".to_string(), Value::Str(flow.id.to_string()));
    let mut env = HashMap::new();
    for (k, v) in &flow.defaults.env {
        env.insert(k.clone(), Value::Str(v.clone()));
    }
    flow_fields.insert("env".to_string(), Value::Map(env));
    Scope::root().bind("flow", Value::Map(flow_fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowctl_core::expr::{Expression, Opt};
    use flowctl_core::ident::Identifier;
    use flowctl_core::types::{LocalPath, RemotePath, Uri};
    use crate::remote::RecordingCliRunner;

    struct NoopRoles;

    #[async_trait]
    impl RoleManager for NoopRoles {
        async fn create_project_role(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn share(&self, _uri: &str, _role: &str) -> Result<()> {
            Ok(())
        }
    }

    fn volume(local: Option<&str>) -> Volume {
        Volume {
            id: Identifier::new("data").unwrap(),
            uri: Expression::Literal(Uri::parse("storage:/proj/data").unwrap()),
            mount: Expression::Literal(RemotePath::parse("/mnt/data").unwrap()),
            read_only: Expression::Literal(false),
            local: match local {
                Some(p) => Opt(Some(Expression::Literal(LocalPath::parse(p).unwrap()))),
                None => Opt::absent(),
            },
        }
    }

    #[tokio::test]
    async fn upload_issues_mkdir_then_copy() {
        let cli = Arc::new(RecordingCliRunner::default());
        let driver = VolumeDriver::new(cli.clone(), Arc::new(NoopRoles), None);
        let scope = Scope::root();
        let v = volume(Some("./data"));

        driver.upload(&v, &scope).await.unwrap();

        let calls = cli.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].argv[0], "mkdir");
        assert_eq!(calls[0].argv[2], "storage:/proj");
        assert_eq!(calls[1].argv[0], "cp");
        assert_eq!(calls[1].argv[4], "./data");
        assert_eq!(calls[1].argv[5], "storage:/proj/data");
    }

    #[tokio::test]
    async fn upload_rejects_volume_without_local_side() {
        let cli = Arc::new(RecordingCliRunner::default());
        let driver = VolumeDriver::new(cli, Arc::new(NoopRoles), None);
        let scope = Scope::root();
        let v = volume(None);
        assert!(driver.upload(&v, &scope).await.is_err());
    }

    #[tokio::test]
    async fn build_rejects_non_buildable_image() {
        let cli = Arc::new(RecordingCliRunner::default());
        let driver = VolumeDriver::new(cli, Arc::new(NoopRoles), None);
        let scope = Scope::root();
        let image = Image {
            id: Identifier::new("app").unwrap(),
            reference: Expression::Literal(Uri::parse("image:app:latest").unwrap()),
            context: Opt::absent(),
            dockerfile: Opt::absent(),
            build_args: HashMap::new(),
            env: HashMap::new(),
            build_preset: Opt::absent(),
            force_rebuild: Expression::Literal(false),
        };
        let err = driver.build(&image, false, &scope).await.unwrap_err();
        assert!(matches!(err, RunnerError::MissingDockerfile(_)));
    }
}
