//! Configuration of the pipeline (paths to reference data and tools).

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// Configuration of a pipeline deployment, loaded from TOML.
///
/// All keys are optional; the defaults match the layout of the container
/// image that ships the external tools.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConf {
    /// Root directory below which one directory per run is created.
    pub path_results: String,
    /// Path to the reference genome FASTA (indexed for BWA).
    pub path_reference: String,
    /// Path to the ANNOVAR `humandb` directory.
    pub path_humandb: String,
    /// Genome build version as understood by ANNOVAR.
    pub buildver: String,
    /// Optional timeout for each external stage; no timeout if absent.
    pub stage_timeout_secs: Option<u64>,
    /// Names or paths of the external programs.
    pub tools: ToolsConf,
}

impl Default for PipelineConf {
    fn default() -> Self {
        Self {
            path_results: "results".to_string(),
            path_reference: "/app/reference/hg38.fa".to_string(),
            path_humandb: "/app/annovar/humandb/".to_string(),
            buildver: "hg38".to_string(),
            stage_timeout_secs: None,
            tools: ToolsConf::default(),
        }
    }
}

/// Programs invoked by the pipeline stages.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConf {
    pub bwa: String,
    pub samtools: String,
    pub freebayes: String,
    pub bcftools: String,
    pub table_annovar: String,
}

impl Default for ToolsConf {
    fn default() -> Self {
        Self {
            bwa: "bwa".to_string(),
            samtools: "samtools".to_string(),
            freebayes: "freebayes".to_string(),
            bcftools: "bcftools".to_string(),
            table_annovar: "table_annovar.pl".to_string(),
        }
    }
}

impl PipelineConf {
    /// Load configuration from the TOML file at `path`.
    pub fn from_path<P>(path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        let toml_str = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not read config file {:?}: {}", path.as_ref(), e)
        })?;
        toml::from_str(&toml_str).map_err(|e| {
            anyhow::anyhow!("could not parse config file {:?}: {}", path.as_ref(), e)
        })
    }

    /// The per-stage timeout, if any.
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{PipelineConf, ToolsConf};

    #[test]
    fn test_parse_config_full() -> Result<(), anyhow::Error> {
        let toml_data = PipelineConf::from_path("tests/conf/full.toml")?;

        assert_eq!(
            toml_data,
            PipelineConf {
                path_results: "/data/results".to_owned(),
                path_reference: "/data/reference/GRCh38.fa".to_owned(),
                path_humandb: "/data/annovar/humandb".to_owned(),
                buildver: "hg38".to_owned(),
                stage_timeout_secs: Some(7200),
                tools: ToolsConf {
                    bwa: "/opt/bwa/bwa".to_owned(),
                    samtools: "samtools".to_owned(),
                    freebayes: "freebayes".to_owned(),
                    bcftools: "/opt/bcftools/bin/bcftools".to_owned(),
                    table_annovar: "/opt/annovar/table_annovar.pl".to_owned(),
                },
            }
        );

        Ok(())
    }

    #[test]
    fn test_parse_config_empty_uses_defaults() -> Result<(), anyhow::Error> {
        let toml_data: PipelineConf = toml::from_str("")?;

        assert_eq!(toml_data, PipelineConf::default());
        assert_eq!(toml_data.stage_timeout(), None);

        Ok(())
    }

    #[test]
    fn test_parse_config_partial_tools() -> Result<(), anyhow::Error> {
        let toml_data: PipelineConf = toml::from_str(
            r#"
            stage_timeout_secs = 60

            [tools]
            freebayes = "/usr/local/bin/freebayes"
            "#,
        )?;

        assert_eq!(toml_data.tools.freebayes, "/usr/local/bin/freebayes");
        assert_eq!(toml_data.tools.bwa, "bwa");
        assert_eq!(
            toml_data.stage_timeout(),
            Some(std::time::Duration::from_secs(60))
        );

        Ok(())
    }

    #[test]
    fn test_parse_config_unknown_key() {
        let result: Result<PipelineConf, _> = toml::from_str("path_uploads = \"uploads\"");

        assert!(result.is_err());
    }
}
