//! Execution of parsed commands

use super::commands::{Commands, JudgeArgs};
use super::manifest::{read_text, BatchManifest};
use super::report;
use crate::checks::{CheckInstance, CheckRegistry, InstanceReport, RunOutput, Runner};
use crate::config::Config;
use crate::error::{PerfCheckError, Result};
use crate::metrics::SuiteSummary;
use crate::site::SiteConfig;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

/// Loaded configuration plus the check registry
pub struct App {
    config: Config,
    registry: CheckRegistry,
    runner: Runner,
    json: bool,
}

impl App {
    pub fn new(config: Config, json: bool) -> Result<Self> {
        let registry = CheckRegistry::builtin()?;
        let runner = Runner::from_config(&config);
        Ok(Self {
            config,
            registry,
            runner,
            json,
        })
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    fn site(&self) -> Result<SiteConfig> {
        SiteConfig::from_file(&self.config.site.path)
    }

    /// Run one command. `Ok(false)` means it ran but something failed.
    pub async fn execute(&self, command: Commands) -> Result<bool> {
        match command {
            Commands::List { tag } => self.list(tag.as_deref()),
            Commands::Instances { check } => self.instances(&check),
            Commands::References { check } => self.references(&check),
            Commands::Judge(args) => self.judge(args).await,
            Commands::Batch { manifest } => self.batch(&manifest).await,
            Commands::Validate => self.validate(),
            Commands::InitConfig { path } => {
                Config::create_sample_config(&path)?;
                println!("Wrote sample configuration to {}", path.display());
                Ok(true)
            }
        }
    }

    fn list(&self, tag: Option<&str>) -> Result<bool> {
        let checks: Vec<_> = match tag {
            Some(tag) => self.registry.with_tag(tag).collect(),
            None => self.registry.iter().collect(),
        };

        if self.json {
            #[derive(Serialize)]
            struct Listing<'a> {
                name: &'a str,
                descr: &'a str,
                tags: Vec<&'a str>,
            }
            let listing: Vec<Listing> = checks
                .iter()
                .map(|c| Listing {
                    name: &c.name,
                    descr: &c.descr,
                    tags: c.tags.iter().map(String::as_str).collect(),
                })
                .collect();
            print_json(&listing)?;
        } else {
            for check in checks {
                let tags: Vec<&str> = check.tags.iter().map(String::as_str).collect();
                println!("{:<28} {} [{}]", check.name, check.descr, tags.join(", "));
            }
        }
        Ok(true)
    }

    fn instances(&self, check: &str) -> Result<bool> {
        let spec = self.registry.get(check)?;
        let site = self.site()?;
        let instances = spec.instances(&site)?;
        if instances.is_empty() {
            warn!("{} has no valid instance on this site", check);
        }

        let infos: Vec<String> = instances.iter().map(CheckInstance::check_info).collect();
        if self.json {
            print_json(&infos)?;
        } else {
            for info in infos {
                println!("{info}");
            }
        }
        Ok(true)
    }

    fn references(&self, check: &str) -> Result<bool> {
        let spec = self.registry.get(check)?;
        if self.json {
            let entries: Vec<_> = spec
                .references
                .iter()
                .map(|(key, scope, metric, entry)| {
                    serde_json::json!({
                        "key": key,
                        "scope": scope,
                        "metric": metric,
                        "reference": entry,
                    })
                })
                .collect();
            print_json(&entries)?;
        } else {
            println!("{}", report::format_references(&spec));
        }
        Ok(true)
    }

    async fn judge(&self, args: JudgeArgs) -> Result<bool> {
        let spec = self.registry.get(&args.check)?;
        let instance = CheckInstance::from_pairs(spec, &args.system, &args.environ, &args.params)?;
        self.ensure_on_site(&self.site()?, &instance)?;

        let mut output = RunOutput::new(match &args.stdout {
            Some(path) => read_text(path).await?,
            None => String::new(),
        });
        if let Some(path) = &args.stderr {
            output = output.with_stderr(read_text(path).await?);
        }
        if let Some(path) = &args.build_stdout {
            output = output.with_build_stdout(read_text(path).await?);
        }
        for (name, path) in &args.files {
            output = output.with_file(name, read_text(Path::new(path)).await?);
        }
        if let Some(job_id) = args.job_id {
            output = output.with_job_id(job_id);
        }

        let result = self.runner.run(&instance, &output).await;
        let success = matches!(&result, Ok(report) if report.status.is_success());
        self.print_results(&[(instance.check_info(), result)])?;
        Ok(success)
    }

    async fn batch(&self, path: &Path) -> Result<bool> {
        let manifest = BatchManifest::from_file(path)?;
        let site = self.site()?;
        info!("Judging {} runs from {}", manifest.runs.len(), path.display());

        let mut labels = Vec::with_capacity(manifest.runs.len());
        let mut results: Vec<Option<Result<InstanceReport>>> = Vec::with_capacity(manifest.runs.len());
        let mut jobs = Vec::new();
        let mut job_slots = Vec::new();

        for (i, run) in manifest.runs.iter().enumerate() {
            labels.push(format!("{} @{}+{}", run.check, run.system, run.environ));
            let prepared = match run.instance(&self.registry) {
                Ok(instance) => match self.ensure_on_site(&site, &instance) {
                    Ok(()) => run
                        .load_output(manifest.base_dir())
                        .await
                        .map(|output| (instance, output)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match prepared {
                Ok((instance, output)) => {
                    labels[i] = instance.check_info();
                    jobs.push((instance, output));
                    job_slots.push(i);
                    results.push(None);
                }
                Err(e) => {
                    error!("Run {} ({}) not judged: {}", i, labels[i], e);
                    results.push(Some(Err(e)));
                }
            }
        }

        for (slot, result) in job_slots.into_iter().zip(self.runner.judge_batch(jobs).await) {
            results[slot] = Some(result);
        }

        let labelled: Vec<(String, Result<InstanceReport>)> = labels
            .into_iter()
            .zip(results)
            .filter_map(|(label, result)| result.map(|r| (label, r)))
            .collect();
        let summary = SuiteSummary::from_results(labelled.iter().map(|(_, r)| r));

        self.print_results(&labelled)?;
        if self.json {
            print_json(&summary)?;
        } else {
            println!("{}", report::format_summary(&summary));
        }
        Ok(summary.is_success())
    }

    fn validate(&self) -> Result<bool> {
        let site = self.site()?;
        site.validate()?;
        println!(
            "Site {}: {} systems, {} partitions, {} environments",
            self.config.site.path.display(),
            site.systems.len(),
            site.partitions().count(),
            site.environments.len()
        );

        let failures = self.registry.validate();
        for (check, e) in &failures {
            println!("{}", report::format_failure(check, e));
        }

        let mut empty = 0;
        for spec in self.registry.iter() {
            if spec.instances(&site)?.is_empty() {
                warn!("{} has no valid instance on this site", spec.name);
                empty += 1;
            }
        }

        println!(
            "{} checks, {} with invalid references, {} without instances",
            self.registry.len(),
            failures.len(),
            empty
        );
        Ok(failures.is_empty())
    }

    /// Reject runs on partitions or environs the check is not valid for
    fn ensure_on_site(&self, site: &SiteConfig, instance: &CheckInstance) -> Result<()> {
        let spec = self.registry.get(&instance.spec().name)?;
        let info = instance.check_info();
        if spec.instances(site)?.iter().any(|i| i.check_info() == info) {
            Ok(())
        } else {
            Err(PerfCheckError::config(
                format!("{info} is not a valid instance on this site"),
                "system",
            ))
        }
    }

    fn print_results(&self, results: &[(String, Result<InstanceReport>)]) -> Result<()> {
        if self.json {
            let values: Vec<serde_json::Value> = results
                .iter()
                .map(|(label, result)| match result {
                    Ok(report) => serde_json::to_value(report).unwrap_or_else(|e| {
                        serde_json::json!({ "check_info": label, "error": e.to_string() })
                    }),
                    Err(e) => serde_json::json!({
                        "check_info": label,
                        "error": e.to_string(),
                        "kind": e.kind(),
                    }),
                })
                .collect();
            return print_json(&values);
        }

        for (label, result) in results {
            match result {
                Ok(report) => println!("{}", report::format_report(report)),
                Err(e) => println!("{}", report::format_failure(label, e)),
            }
        }
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| PerfCheckError::InternalError {
        message: format!("Failed to serialize output: {e}"),
        component: Some("cli".to_string()),
    })?;
    println!("{text}");
    Ok(())
}
