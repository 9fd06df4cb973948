//! Implementation of `report build` subcommand.
//!
//! Turns the cleaned ANNOVAR table into a spreadsheet with the full table,
//! the exonic and rare variant subsets, and a summary of counts.

pub mod table;
pub mod xlsx;

use std::path::Path;

use thousands::Separable;

use self::table::{AnnotationTable, Value};
use crate::err::SchemaError;

/// Column with the refGene region classification.
pub const COL_FUNC: &str = "Func.refGene";
/// Column with the refGene exonic effect classification.
pub const COL_EXONIC_FUNC: &str = "ExonicFunc.refGene";
/// Column with the ExAC allele frequency over all populations.
pub const COL_EXAC_ALL: &str = "ExAC_ALL";
/// Name of the numeric allele frequency column appended to the output.
pub const COL_EXAC_AF: &str = "ExAC_AF";

/// Region classification of exonic variants.
pub const EXONIC: &str = "exonic";
/// Variants with a known allele frequency below this are rare.
pub const RARE_AF_THRESHOLD: f64 = 0.01;

pub const SHEET_ALL: &str = "All Variants";
pub const SHEET_EXONIC: &str = "Exonic Variants";
pub const SHEET_RARE: &str = "Rare Variants (AF<1%)";
pub const SHEET_SUMMARY: &str = "Summary";

/// MIME type of the produced spreadsheet.
pub const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Command line arguments for `report build` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "build spreadsheet report from cleaned ANNOVAR CSV", long_about = None)]
pub struct Args {
    /// Path to the cleaned ANNOVAR CSV file.
    #[clap(long)]
    pub path_input: String,
    /// Path to the output XLSX file.
    #[clap(long)]
    pub path_output: String,
}

/// One row of the annotation table with the fields the report looks at.
#[derive(Debug, Clone)]
pub struct VariantRecord<'a> {
    /// All fields of the row, in column order.
    pub fields: &'a csv::StringRecord,
    pub func: Value<&'a str>,
    pub exonic_func: Value<&'a str>,
    pub allele_freq: Value<f64>,
}

impl<'a> VariantRecord<'a> {
    pub fn is_exonic(&self) -> bool {
        self.func == Value::Present(EXONIC)
    }

    /// Rare means a known frequency below the threshold; rows without a
    /// usable frequency are never rare.
    pub fn is_rare(&self) -> bool {
        matches!(self.allele_freq, Value::Present(af) if af < RARE_AF_THRESHOLD)
    }
}

/// Counts shown on the summary sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Summary {
    pub total: usize,
    pub exonic: usize,
    pub rare: usize,
    pub nonsynonymous: usize,
    pub stop: usize,
}

impl Summary {
    /// The labelled rows of the summary sheet, in display order.
    pub fn rows(&self) -> [(&'static str, usize); 5] {
        [
            ("Total variants", self.total),
            ("Exonic variants", self.exonic),
            ("Rare variants (AF<1%)", self.rare),
            ("Nonsynonymous SNVs", self.nonsynonymous),
            ("Stopgain/Stoploss", self.stop),
        ]
    }
}

/// The report derived from one annotation table.
#[derive(Debug)]
pub struct Report<'a> {
    /// Output column names: the source header plus [`COL_EXAC_AF`].
    pub headers: Vec<String>,
    pub records: Vec<VariantRecord<'a>>,
    /// Indices into `records` of the exonic variants.
    pub exonic: Vec<usize>,
    /// Indices into `records` of the rare variants.
    pub rare: Vec<usize>,
    pub summary: Summary,
}

impl<'a> Report<'a> {
    /// Derive the subsets and summary from `table`.
    pub fn build(table: &'a AnnotationTable) -> Result<Self, SchemaError> {
        let idx_func = table.column(COL_FUNC)?;
        let idx_exonic_func = table.column(COL_EXONIC_FUNC)?;
        let idx_exac_all = table.column(COL_EXAC_ALL)?;

        let records = table
            .rows
            .iter()
            .map(|fields| VariantRecord {
                fields,
                func: Value::text(&fields[idx_func]),
                exonic_func: Value::text(&fields[idx_exonic_func]),
                allele_freq: Value::number(&fields[idx_exac_all]),
            })
            .collect::<Vec<_>>();

        let unparseable = records
            .iter()
            .filter(|record| record.allele_freq == Value::Unparseable)
            .count();
        if unparseable > 0 {
            tracing::debug!(
                "{} rows have a non-numeric {} value",
                unparseable.separate_with_commas(),
                COL_EXAC_ALL
            );
        }

        let exonic = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_exonic())
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let rare = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_rare())
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        let summary = Summary {
            total: records.len(),
            exonic: exonic.len(),
            rare: rare.len(),
            nonsynonymous: records
                .iter()
                .filter(|record| record.exonic_func.contains("nonsynonymous"))
                .count(),
            stop: records
                .iter()
                .filter(|record| record.exonic_func.contains("stop"))
                .count(),
        };

        let mut headers = table
            .headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>();
        headers.push(COL_EXAC_AF.to_string());

        Ok(Self {
            headers,
            records,
            exonic,
            rare,
            summary,
        })
    }

    pub fn exonic_records(&self) -> impl Iterator<Item = &VariantRecord<'a>> {
        self.exonic.iter().map(|&i| &self.records[i])
    }

    pub fn rare_records(&self) -> impl Iterator<Item = &VariantRecord<'a>> {
        self.rare.iter().map(|&i| &self.records[i])
    }
}

/// Build the spreadsheet at `path_output` from the cleaned table at
/// `path_input`.
pub fn build_report<P, Q>(path_input: P, path_output: Q) -> Result<Summary, anyhow::Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let before_loading = std::time::Instant::now();
    let table = AnnotationTable::from_path(path_input.as_ref())?;
    tracing::debug!(
        "loaded {} rows from {:?} in {:?}",
        table.rows.len().separate_with_commas(),
        path_input.as_ref(),
        before_loading.elapsed()
    );

    let report = Report::build(&table)?;
    xlsx::write_report(&report, path_output.as_ref())?;
    crate::common::trace_rss_now();

    Ok(report.summary)
}

/// Main entry point for `report build` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let summary = build_report(&args.path_input, &args.path_output)?;
    for (label, count) in summary.rows() {
        tracing::info!("  {}: {}", label, count.separate_with_commas());
    }

    tracing::info!(
        "All of `report build` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{table::AnnotationTable, Report, Summary};
    use crate::err::SchemaError;

    #[test]
    fn scenario_counts() -> Result<(), anyhow::Error> {
        let table = AnnotationTable::from_path("tests/report/scenario.clean.csv")?;

        let report = Report::build(&table)?;

        assert_eq!(
            report.summary,
            Summary {
                total: 2,
                exonic: 1,
                rare: 1,
                nonsynonymous: 1,
                stop: 0,
            }
        );
        assert_eq!(report.exonic, vec![0]);
        assert_eq!(report.rare, vec![0]);
        assert_eq!(report.headers.last().map(String::as_str), Some("ExAC_AF"));

        Ok(())
    }

    #[test]
    fn annotated_counts() -> Result<(), anyhow::Error> {
        let table = AnnotationTable::from_path("tests/report/annotated.clean.csv")?;

        let report = Report::build(&table)?;

        assert_eq!(
            report.summary,
            Summary {
                total: 8,
                exonic: 4,
                rare: 4,
                nonsynonymous: 2,
                stop: 2,
            }
        );
        // "exonic;splicing" and "Exonic" are not exonic
        assert_eq!(report.exonic, vec![0, 1, 4, 6]);
        // 0.01 is not rare, "." and "n/a" are unknown
        assert_eq!(report.rare, vec![1, 3, 4, 6]);

        Ok(())
    }

    #[test]
    fn subsets_follow_their_definition() -> Result<(), anyhow::Error> {
        let table = AnnotationTable::from_path("tests/report/annotated.clean.csv")?;
        let idx_func = table.column("Func.refGene")?;
        let idx_af = table.column("ExAC_ALL")?;

        let report = Report::build(&table)?;

        for (i, row) in table.rows.iter().enumerate() {
            assert_eq!(report.exonic.contains(&i), &row[idx_func] == "exonic");
            let af = row[idx_af].parse::<f64>().ok();
            assert_eq!(report.rare.contains(&i), af.map(|af| af < 0.01).unwrap_or(false));
        }
        let summary = report.summary;
        assert!(summary.exonic <= summary.total);
        assert!(summary.rare <= summary.total);
        assert!(summary.nonsynonymous <= summary.total);
        assert!(summary.stop <= summary.total);
        assert_eq!(report.exonic_records().count(), summary.exonic);
        assert_eq!(report.rare_records().count(), summary.rare);

        Ok(())
    }

    #[test]
    fn missing_frequency_is_not_rare() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("missing.csv");
        std::fs::write(
            &path,
            "Func.refGene,ExonicFunc.refGene,ExAC_ALL\nexonic,.,.\nexonic,stopgain,\n",
        )?;
        let table = AnnotationTable::from_path(&path)?;

        let report = Report::build(&table)?;

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.rare, 0);
        assert_eq!(report.summary.stop, 1);

        Ok(())
    }

    #[test]
    fn header_only_table() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("header.csv");
        std::fs::write(&path, "Chr,Func.refGene,ExonicFunc.refGene,ExAC_ALL\n")?;
        let table = AnnotationTable::from_path(&path)?;

        let report = Report::build(&table)?;

        assert_eq!(report.summary, Summary::default());

        Ok(())
    }

    #[rstest::rstest]
    #[case("Func.refGene")]
    #[case("ExonicFunc.refGene")]
    #[case("ExAC_ALL")]
    fn missing_required_column(#[case] column: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("schema.csv");
        let header = ["Chr", "Func.refGene", "ExonicFunc.refGene", "ExAC_ALL"]
            .into_iter()
            .filter(|name| *name != column)
            .collect::<Vec<_>>();
        std::fs::write(&path, format!("{}\n", header.join(",")))?;
        let table = AnnotationTable::from_path(&path)?;

        let err = Report::build(&table).unwrap_err();

        match err {
            SchemaError::MissingColumn { column: missing, .. } => assert_eq!(missing, column),
            other => panic!("unexpected error: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn build_report_missing_column_writes_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_in = tmp_dir.join("schema.csv");
        let path_out = tmp_dir.join("out.xlsx");
        std::fs::write(&path_in, "Chr,Start\n1,100\n")?;

        let err = super::build_report(&path_in, &path_out).unwrap_err();

        assert!(err.downcast_ref::<SchemaError>().is_some());
        assert!(!path_out.exists());

        Ok(())
    }

    #[test]
    fn run_smoke() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let args = super::Args {
            path_input: "tests/report/annotated.clean.csv".into(),
            path_output: tmp_dir.join("annotated_variants.xlsx").to_str().unwrap().into(),
        };

        super::run(&crate::common::Args::default(), &args)?;

        assert!(tmp_dir.join("annotated_variants.xlsx").exists());

        Ok(())
    }
}
