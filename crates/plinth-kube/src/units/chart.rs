//! Helm chart and raw manifest units

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::Arc;
use tracing::info;

use plinth_core::{CoreError, InstallationOption, OptionSet, Timeouts, UnitKind, UnitSpec};

use crate::cluster::ClusterApi;
use crate::deployment::{Deployment, guard_delete, guard_deploy, guard_upgrade};
use crate::error::Result;
use crate::exec::{CommandRunner, Invocation, run_checked};
use crate::ownership::create_owned_namespace;
use crate::progress::Ui;
use crate::readiness::{
    wait_for_crd_established, wait_for_namespace_missing, wait_for_pods_by_selector_running,
    wait_until_pods_exist,
};
use crate::wait::{RetryPolicy, is_transient, retry_if};

static OPTION_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid regex"));

const HELM_BENIGN: &[&str] = &["release: not found"];
const KUBECTL_BENIGN: &[&str] = &["(NotFound)", "no matches for kind"];

/// Escape a value for `helm --set` so it stays one value
fn escape_set_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A unit applied with `helm` (chart) or `kubectl apply` (manifest)
pub struct ChartUnit {
    spec: UnitSpec,
    options: OptionSet,
    runner: Arc<dyn CommandRunner>,
    timeouts: Timeouts,
}

impl ChartUnit {
    pub fn new(spec: UnitSpec, runner: Arc<dyn CommandRunner>, timeouts: Timeouts) -> Result<Self> {
        let mut options = spec.needed_options()?;
        if let Some(skip) = &spec.skip_option
            && !options.iter().any(|o| &o.name == skip)
        {
            options.insert(
                InstallationOption::bool(skip, false)
                    .describe(format!("Skip installing {}", spec.id)),
            );
        }
        Ok(Self {
            spec,
            options,
            runner,
            timeouts,
        })
    }

    pub fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    fn skip_reason(&self, options: &OptionSet) -> Result<Option<String>> {
        let Some(skip) = &self.spec.skip_option else {
            return Ok(None);
        };
        Ok(options
            .get_bool(skip, Some(self.spec.id.as_str()))?
            .then(|| format!("{} is set", skip)))
    }

    /// Replace `${name}` with the resolved option value
    fn interpolate(&self, template: &str, options: &OptionSet) -> Result<String> {
        self.interpolate_with(template, options, str::to_string)
    }

    /// Like [`Self::interpolate`], passing each substituted value through `escape`
    fn interpolate_with(
        &self,
        template: &str,
        options: &OptionSet,
        escape: impl Fn(&str) -> String,
    ) -> Result<String> {
        let mut missing = None;
        let out = OPTION_REF.replace_all(template, |caps: &Captures| {
            match options.get(&caps[1], Some(self.spec.id.as_str())) {
                Some(option) => escape(&option.value().to_string()),
                None => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(CoreError::UnknownOption { name }.into()),
            None => Ok(out.into_owned()),
        }
    }

    fn apply_invocation(
        &self,
        options: &OptionSet,
        upgrade: bool,
        extra: &[(String, String)],
    ) -> Result<Invocation> {
        let spec = &self.spec;
        if spec.kind == UnitKind::Manifest {
            let manifest = spec
                .manifest
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Ok(Invocation::new("kubectl").args([
                "apply",
                "--namespace",
                spec.id.as_str(),
                "--filename",
                manifest.as_str(),
            ]));
        }

        let mut inv = Invocation::new("helm")
            .arg(if upgrade { "upgrade" } else { "install" })
            .arg(spec.release_name())
            .arg(spec.chart.clone().unwrap_or_default())
            .args(["--namespace", spec.id.as_str()]);
        if !spec.version.is_empty() {
            inv = inv.args(["--version", spec.version.as_str()]);
        }
        if let Some(repo) = &spec.repo {
            inv = inv.args(["--repo", repo.as_str()]);
        }
        for (key, value) in &spec.set {
            let value = self.interpolate_with(value, options, escape_set_value)?;
            inv = inv.arg("--set").arg(format!("{}={}", key, value));
        }
        for (key, value) in extra {
            inv = inv.arg("--set").arg(format!("{}={}", key, value));
        }
        Ok(inv)
    }

    async fn apply(
        &self,
        cluster: &dyn ClusterApi,
        ui: &Ui,
        options: &OptionSet,
        upgrade: bool,
        extra: &[(String, String)],
    ) -> Result<()> {
        let inv = self.apply_invocation(options, upgrade, extra)?;
        ui.detail(inv.command_line());
        run_checked(self.runner.as_ref(), &inv, &[]).await?;

        self.wait_ready(cluster, ui).await?;
        self.post_apply(ui, options).await
    }

    async fn wait_ready(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        let timeout = self.timeouts.deployment_timeout();
        for selector in &self.spec.ready {
            ui.progress(format!("Waiting for pods {} in {}", selector, self.spec.id));
            wait_until_pods_exist(cluster, &self.spec.id, selector, timeout).await?;
            wait_for_pods_by_selector_running(cluster, &self.spec.id, selector, timeout).await?;
        }
        for crd in &self.spec.crds {
            ui.progress(format!("Waiting for CRD {}", crd));
            wait_for_crd_established(cluster, crd, timeout).await?;
        }
        Ok(())
    }

    /// Apply follow-up manifests, retrying while webhooks come up
    async fn post_apply(&self, ui: &Ui, options: &OptionSet) -> Result<()> {
        let policy = RetryPolicy::from(&self.timeouts);
        for manifest in &self.spec.post_apply {
            let inv = Invocation::new("kubectl")
                .args(["apply", "--filename", "-"])
                .stdin(self.interpolate(manifest, options)?);
            ui.detail(inv.command_line());
            retry_if(policy, is_transient, || {
                run_checked(self.runner.as_ref(), &inv, &[])
            })
            .await?;
        }
        Ok(())
    }

    /// Deploy with extra chart values; `false` when the unit was skipped
    pub async fn deploy_with(
        &self,
        cluster: &dyn ClusterApi,
        ui: &Ui,
        options: &OptionSet,
        extra: &[(String, String)],
    ) -> Result<bool> {
        if let Some(reason) = self.skip_reason(options)? {
            ui.exclamation(format!("Skipping {}: {}", self.spec.id, reason));
            return Ok(false);
        }
        guard_deploy(cluster, &self.spec.id).await?;

        info!(unit = %self.spec.id, version = %self.spec.version, "deploying");
        ui.note(format!("Deploying {}", self.describe()));
        create_owned_namespace(cluster, &self.spec.id).await?;
        self.apply(cluster, ui, options, false, extra).await?;
        ui.success(format!("{} deployed", self.spec.id));
        Ok(true)
    }

    /// Upgrade with extra chart values; `false` when the unit was skipped
    pub async fn upgrade_with(
        &self,
        cluster: &dyn ClusterApi,
        ui: &Ui,
        options: &OptionSet,
        extra: &[(String, String)],
    ) -> Result<bool> {
        if let Some(reason) = self.skip_reason(options)? {
            ui.exclamation(format!("Skipping {}: {}", self.spec.id, reason));
            return Ok(false);
        }
        guard_upgrade(cluster, &self.spec.id).await?;

        info!(unit = %self.spec.id, version = %self.spec.version, "upgrading");
        ui.note(format!("Upgrading {}", self.describe()));
        self.apply(cluster, ui, options, true, extra).await?;
        ui.success(format!("{} upgraded", self.spec.id));
        Ok(true)
    }

    async fn remove_workload(&self, ui: &Ui) -> Result<()> {
        let spec = &self.spec;
        let (inv, benign) = match spec.kind {
            UnitKind::Manifest => {
                let manifest = spec
                    .manifest
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                let inv = Invocation::new("kubectl").args([
                    "delete",
                    "--namespace",
                    spec.id.as_str(),
                    "--filename",
                    manifest.as_str(),
                ]);
                (inv, KUBECTL_BENIGN)
            }
            UnitKind::Chart | UnitKind::Ingress => {
                let inv = Invocation::new("helm").args([
                    "uninstall",
                    spec.release_name(),
                    "--namespace",
                    spec.id.as_str(),
                ]);
                (inv, HELM_BENIGN)
            }
        };

        ui.detail(inv.command_line());
        let out = run_checked(self.runner.as_ref(), &inv, benign).await?;
        if !out.success {
            ui.exclamation(format!("{}: nothing to uninstall, continuing", spec.id));
        }
        Ok(())
    }
}

#[async_trait]
impl Deployment for ChartUnit {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn describe(&self) -> String {
        let name = if self.spec.version.is_empty() {
            self.spec.id.clone()
        } else {
            format!("{} {}", self.spec.id, self.spec.version)
        };
        if self.spec.description.is_empty() {
            name
        } else {
            format!("{} ({})", self.spec.description, name)
        }
    }

    fn needed_options(&self) -> OptionSet {
        self.options.clone()
    }

    async fn deploy(&self, cluster: &dyn ClusterApi, ui: &Ui, options: &OptionSet) -> Result<()> {
        self.deploy_with(cluster, ui, options, &[]).await.map(drop)
    }

    async fn upgrade(&self, cluster: &dyn ClusterApi, ui: &Ui, options: &OptionSet) -> Result<()> {
        self.upgrade_with(cluster, ui, options, &[]).await.map(drop)
    }

    async fn delete(&self, cluster: &dyn ClusterApi, ui: &Ui) -> Result<()> {
        if !guard_delete(cluster, ui, &self.spec.id).await? {
            return Ok(());
        }

        info!(unit = %self.spec.id, "removing");
        ui.note(format!("Removing {}", self.spec.id));
        self.remove_workload(ui).await?;

        cluster.delete_namespace(&self.spec.id).await?;
        ui.progress(format!("Waiting for namespace {} to be deleted", self.spec.id));
        wait_for_namespace_missing(
            cluster,
            &self.spec.id,
            self.timeouts.namespace_deletion_timeout(),
        )
        .await?;
        ui.success(format!("{} removed", self.spec.id));
        Ok(())
    }
}
