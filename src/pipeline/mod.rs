//! Implementation of `pipeline run` subcommand.
//!
//! Reads are aligned with BWA, variants called with freebayes, normalized
//! with bcftools and annotated with ANNOVAR.  The ANNOVAR CSV is then cleaned
//! and turned into the spreadsheet report.  Each step consumes the output
//! file of the previous one; the first failure aborts the run.

pub mod input;
pub mod stage;

use std::path::{Path, PathBuf};

use anyhow::Context;
use thousands::Separable;

use self::stage::{Invocation, ProcessRunner, RunStage, Stage, StageName, StageResult};
use crate::{
    annos,
    conf::PipelineConf,
    report,
    workspace::{RunDir, Workspace},
};

/// ANNOVAR databases to annotate with.
pub const ANNOVAR_PROTOCOLS: &str = "refGene,exac03,avsnp147,dbnsfp30a";
/// ANNOVAR operation for each of [`ANNOVAR_PROTOCOLS`]: gene-based, then
/// filter-based.
pub const ANNOVAR_OPERATIONS: &str = "g,f,f,f";

/// Command line arguments for `pipeline run` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "run the pipeline from reads to annotated variant report", long_about = None)]
pub struct Args {
    /// Path to TOML configuration file; defaults apply if not given.
    #[clap(long)]
    pub path_config: Option<String>,
    /// Override the root directory for run directories.
    #[clap(long)]
    pub path_results: Option<String>,
    /// Override the path to the reference FASTA.
    #[clap(long)]
    pub path_reference: Option<String>,
    /// Override the path to the ANNOVAR humandb directory.
    #[clap(long)]
    pub path_humandb: Option<String>,
    /// Override the timeout of each external stage in seconds.
    #[clap(long)]
    pub stage_timeout_secs: Option<u64>,
    /// Optional path to write a JSON manifest of the finished run to.
    #[clap(long)]
    pub path_manifest: Option<String>,
    /// The FASTQ files with the reads.
    #[clap(required = true)]
    pub path_reads: Vec<String>,
}

impl Args {
    /// Load the configuration file and apply the overrides from the command
    /// line.
    pub fn load_conf(&self) -> Result<PipelineConf, anyhow::Error> {
        let mut conf = match &self.path_config {
            Some(path) => PipelineConf::from_path(crate::common::expand_path(path)?)?,
            None => PipelineConf::default(),
        };
        if let Some(path_results) = &self.path_results {
            conf.path_results = path_results.clone();
        }
        if let Some(path_reference) = &self.path_reference {
            conf.path_reference = path_reference.clone();
        }
        if let Some(path_humandb) = &self.path_humandb {
            conf.path_humandb = path_humandb.clone();
        }
        if self.stage_timeout_secs.is_some() {
            conf.stage_timeout_secs = self.stage_timeout_secs;
        }
        Ok(conf)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed { stage: StageName },
}

/// One execution of the pipeline.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Run {
    pub run_id: String,
    pub path_reads: Vec<PathBuf>,
    pub path_dir: PathBuf,
    /// Results of the completed stages, in order.
    pub stages: Vec<StageResult>,
    pub status: RunStatus,
}

impl Run {
    pub fn new(run_dir: &RunDir, path_reads: Vec<PathBuf>) -> Self {
        Self {
            run_id: run_dir.run_id.clone(),
            path_reads,
            path_dir: run_dir.path.clone(),
            stages: Vec::new(),
            status: RunStatus::Running,
        }
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.path_dir.join(name)
    }
}

/// What the caller gets back from a successful run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub path_dir: PathBuf,
    pub path_report: PathBuf,
    /// File name to offer the report for download as.
    pub download_name: String,
    pub mime_type: &'static str,
    pub summary: report::Summary,
    pub worker_version: &'static str,
}

/// Paths of the reference data and programs the stages use.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub path_reference: PathBuf,
    pub path_humandb: PathBuf,
    pub buildver: String,
    pub tools: crate::conf::ToolsConf,
}

impl StageContext {
    pub fn from_conf(conf: &PipelineConf) -> Result<Self, anyhow::Error> {
        Ok(Self {
            path_reference: crate::common::expand_path(&conf.path_reference)?,
            path_humandb: crate::common::expand_path(&conf.path_humandb)?,
            buildver: conf.buildver.clone(),
            tools: conf.tools.clone(),
        })
    }

    /// `bwa mem <ref> <reads...> | samtools sort -o <bam>`
    pub fn align(&self, path_reads: &[PathBuf], path_bam: &Path) -> Stage {
        Stage {
            name: StageName::Align,
            chain: vec![
                Invocation::new(&self.tools.bwa)
                    .arg("mem")
                    .arg(&self.path_reference)
                    .args(path_reads),
                Invocation::new(&self.tools.samtools)
                    .arg("sort")
                    .arg("-o")
                    .arg(path_bam),
            ],
            outputs: vec![path_bam.to_path_buf()],
        }
    }

    /// `samtools index <bam>`; the BAM file stays the output.
    pub fn index(&self, path_bam: &Path) -> Stage {
        Stage {
            name: StageName::Index,
            chain: vec![Invocation::new(&self.tools.samtools)
                .arg("index")
                .arg(path_bam)],
            outputs: vec![path_bam.to_path_buf()],
        }
    }

    /// `freebayes -f <ref> <bam> > <vcf>`
    pub fn call_variants(&self, path_bam: &Path, path_vcf: &Path) -> Stage {
        Stage {
            name: StageName::CallVariants,
            chain: vec![Invocation::new(&self.tools.freebayes)
                .arg("-f")
                .arg(&self.path_reference)
                .arg(path_bam)
                .stdout_to(path_vcf)],
            outputs: vec![path_vcf.to_path_buf()],
        }
    }

    /// `bcftools norm -m-any <vcf> | bcftools norm -f <ref> -o <normalized>`
    pub fn normalize(&self, path_vcf: &Path, path_normalized: &Path) -> Stage {
        Stage {
            name: StageName::Normalize,
            chain: vec![
                Invocation::new(&self.tools.bcftools)
                    .arg("norm")
                    .arg("-m-any")
                    .arg(path_vcf),
                Invocation::new(&self.tools.bcftools)
                    .arg("norm")
                    .arg("-f")
                    .arg(&self.path_reference)
                    .arg("-o")
                    .arg(path_normalized),
            ],
            outputs: vec![path_normalized.to_path_buf()],
        }
    }

    /// Path of the CSV file that ANNOVAR writes for output prefix `prefix`.
    pub fn annovar_csv(&self, prefix: &Path) -> PathBuf {
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!(".{}_multianno.csv", &self.buildver));
        PathBuf::from(name)
    }

    /// `table_annovar.pl <vcf> <humandb> ... -csvout`
    pub fn annotate(&self, path_normalized: &Path, prefix: &Path) -> Stage {
        Stage {
            name: StageName::Annotate,
            chain: vec![Invocation::new(&self.tools.table_annovar)
                .arg(path_normalized)
                .arg(&self.path_humandb)
                .arg("-buildver")
                .arg(&self.buildver)
                .arg("-out")
                .arg(prefix)
                .arg("-remove")
                .arg("-protocol")
                .arg(ANNOVAR_PROTOCOLS)
                .arg("-operation")
                .arg(ANNOVAR_OPERATIONS)
                .arg("-nastring")
                .arg(report::table::NA_STRING)
                .arg("-csvout")],
            outputs: vec![self.annovar_csv(prefix)],
        }
    }
}

/// Run `stage` and record its result in `run`, marking the run as failed on
/// error.
fn run_external(
    runner: &dyn RunStage,
    run: &mut Run,
    stage: &Stage,
) -> Result<PathBuf, anyhow::Error> {
    match runner.run_stage(stage).and_then(|result| {
        let output = result.output()?.to_path_buf();
        Ok((result, output))
    }) {
        Ok((result, output)) => {
            run.stages.push(result);
            Ok(output)
        }
        Err(e) => {
            run.status = RunStatus::Failed { stage: e.stage() };
            Err(e.into())
        }
    }
}

/// Run an in-process step and record its declared output in `run`.
fn run_internal<F, T>(
    run: &mut Run,
    name: StageName,
    output: &Path,
    step: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Result<T, anyhow::Error>,
{
    let before = std::time::Instant::now();
    tracing::info!("running stage `{}`...", name);
    let checked = step().and_then(|value| {
        let result = stage::check_outputs(name, &[output.to_path_buf()])?;
        Ok((value, result))
    });
    match checked {
        Ok((value, result)) => {
            run.stages.push(result);
            tracing::info!("... done with stage `{}` in {:?}", name, before.elapsed());
            Ok(value)
        }
        Err(e) => {
            run.status = RunStatus::Failed { stage: name };
            Err(e.context(format!("stage `{}` failed", name)))
        }
    }
}

/// Execute all stages of `run` in order, returning the report summary.
pub fn run_pipeline(
    ctx: &StageContext,
    runner: &dyn RunStage,
    run: &mut Run,
) -> Result<(PathBuf, report::Summary), anyhow::Error> {
    let stage = ctx.align(&run.path_reads, &run.artifact("aligned.bam"));
    let path_bam = run_external(runner, run, &stage)?;
    let stage = ctx.index(&path_bam);
    let path_bam = run_external(runner, run, &stage)?;
    let stage = ctx.call_variants(&path_bam, &run.artifact("variants.vcf"));
    let path_vcf = run_external(runner, run, &stage)?;
    let stage = ctx.normalize(&path_vcf, &run.artifact("normalized.vcf"));
    let path_normalized = run_external(runner, run, &stage)?;
    let stage = ctx.annotate(&path_normalized, &run.artifact("annotated"));
    let path_annovar = run_external(runner, run, &stage)?;

    let path_clean = run.artifact("annotated.clean.csv");
    let stats = run_internal(run, StageName::Clean, &path_clean, || {
        annos::clean::clean_file(&path_annovar, &path_clean)
    })?;
    tracing::info!(
        "  dropped {} meta lines from ANNOVAR output",
        stats.dropped.separate_with_commas()
    );

    let path_report = run.artifact("annotated_variants.xlsx");
    let summary = run_internal(run, StageName::Report, &path_report, || {
        report::build_report(&path_clean, &path_report)
    })?;

    run.status = RunStatus::Succeeded;
    Ok((path_report, summary))
}

/// Validate the reads, allocate a run directory and run the pipeline.
pub fn execute(
    conf: &PipelineConf,
    runner: &dyn RunStage,
    path_reads: Vec<PathBuf>,
    now: &chrono::DateTime<chrono::Local>,
) -> Result<RunOutcome, anyhow::Error> {
    input::validate_read_files(&path_reads)?;
    let ctx = StageContext::from_conf(conf)?;

    let workspace = Workspace::new(crate::common::expand_path(&conf.path_results)?);
    tracing::debug!("allocating run directory below {:?}", workspace.root());
    let run_dir = workspace.allocate(now)?;
    tracing::info!("starting run {} in {:?}", &run_dir.run_id, &run_dir.path);

    let mut run = Run::new(&run_dir, path_reads);
    let result = run_pipeline(&ctx, runner, &mut run);
    tracing::debug!("run = {:#?}", &run);
    let (path_report, summary) = result.with_context(|| format!("run {} failed", &run.run_id))?;

    Ok(RunOutcome {
        download_name: format!("annotated_variants_{}.xlsx", &run.run_id),
        run_id: run.run_id,
        path_dir: run.path_dir,
        path_report,
        mime_type: report::XLSX_MIME_TYPE,
        summary,
        worker_version: crate::common::worker_version(),
    })
}

/// Main entry point for `pipeline run` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let conf = args.load_conf()?;
    tracing::info!("conf = {:#?}", &conf);

    let path_reads = args
        .path_reads
        .iter()
        .map(|path| crate::common::expand_path(path))
        .collect::<Result<Vec<_>, _>>()?;
    let runner = ProcessRunner::new(conf.stage_timeout())?;
    let outcome = execute(&conf, &runner, path_reads, &chrono::Local::now())?;

    tracing::info!("report written to {:?}", &outcome.path_report);
    for (label, count) in outcome.summary.rows() {
        tracing::info!("  {}: {}", label, count.separate_with_commas());
    }
    if let Some(path_manifest) = &args.path_manifest {
        let file = std::fs::File::create(path_manifest).map_err(|e| {
            anyhow::anyhow!("could not create manifest {:?}: {}", path_manifest, e)
        })?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &outcome)?;
    }

    tracing::info!(
        "All of `pipeline run` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}
