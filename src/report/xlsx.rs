//! Writing of the report to an XLSX workbook.

use std::path::Path;

use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, Worksheet, XlsxError};

use super::{Report, VariantRecord, SHEET_ALL, SHEET_EXONIC, SHEET_RARE, SHEET_SUMMARY};

/// Write `report` to `path` with the sheets in fixed order: all, exonic, rare
/// variants and the summary.
pub fn write_report(report: &Report, path: &Path) -> Result<(), anyhow::Error> {
    let before_writing = std::time::Instant::now();
    let header_format = Format::new().set_bold();
    let mut workbook = Workbook::new();

    write_variant_sheet(
        workbook.add_worksheet(),
        SHEET_ALL,
        &report.headers,
        report.records.iter(),
        &header_format,
    )?;
    write_variant_sheet(
        workbook.add_worksheet(),
        SHEET_EXONIC,
        &report.headers,
        report.exonic_records(),
        &header_format,
    )?;
    write_variant_sheet(
        workbook.add_worksheet(),
        SHEET_RARE,
        &report.headers,
        report.rare_records(),
        &header_format,
    )?;

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_SUMMARY)?;
    worksheet.write_string_with_format(0, 0, "Category", &header_format)?;
    worksheet.write_string_with_format(0, 1, "Count", &header_format)?;
    for (row, (label, count)) in report.summary.rows().into_iter().enumerate() {
        let row = row as RowNum + 1;
        worksheet.write_string(row, 0, label)?;
        worksheet.write_number(row, 1, count as f64)?;
    }
    worksheet.autofit();

    workbook
        .save(path)
        .map_err(|e| anyhow::anyhow!("could not write spreadsheet {:?}: {}", path, e))?;
    tracing::debug!("wrote {:?} in {:?}", path, before_writing.elapsed());
    Ok(())
}

/// Write header and `records` to `worksheet`; the numeric allele frequency
/// goes into the last column and stays blank when unknown.
fn write_variant_sheet<'r, 'a: 'r, I>(
    worksheet: &mut Worksheet,
    name: &str,
    headers: &[String],
    records: I,
    header_format: &Format,
) -> Result<(), XlsxError>
where
    I: Iterator<Item = &'r VariantRecord<'a>>,
{
    worksheet.set_name(name)?;
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as ColNum, header, header_format)?;
    }

    let col_af = headers.len().saturating_sub(1) as ColNum;
    for (i, record) in records.enumerate() {
        let row = i as RowNum + 1;
        for (col, field) in record.fields.iter().enumerate() {
            write_cell(worksheet, row, col as ColNum, field)?;
        }
        if let Some(af) = record.allele_freq.present() {
            worksheet.write_number(row, col_af, af)?;
        }
    }
    worksheet.autofit();

    Ok(())
}

/// Write a text cell, as a number if it is one; empty cells stay blank.
fn write_cell(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    field: &str,
) -> Result<(), XlsxError> {
    if field.is_empty() {
        return Ok(());
    }
    match field.parse::<f64>() {
        Ok(number) if number.is_finite() => {
            worksheet.write_number(row, col, number)?;
        }
        _ => {
            worksheet.write_string(row, col, field)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use pretty_assertions::assert_eq;

    use crate::report::{table::AnnotationTable, Report};

    fn write_fixture(
        fixture: &str,
        tmp_dir: &temp_testdir::TempDir,
    ) -> Result<std::path::PathBuf, anyhow::Error> {
        let table = AnnotationTable::from_path(fixture)?;
        let report = Report::build(&table)?;
        let path = tmp_dir.join("annotated_variants.xlsx");
        super::write_report(&report, &path)?;
        Ok(path)
    }

    #[test]
    fn sheet_names_in_order() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = write_fixture("tests/report/scenario.clean.csv", &tmp_dir)?;

        let workbook: Xlsx<_> = open_workbook(&path)?;

        assert_eq!(
            workbook.sheet_names(),
            vec![
                "All Variants",
                "Exonic Variants",
                "Rare Variants (AF<1%)",
                "Summary"
            ]
        );

        Ok(())
    }

    #[test]
    fn summary_sheet() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = write_fixture("tests/report/scenario.clean.csv", &tmp_dir)?;

        let mut workbook: Xlsx<_> = open_workbook(&path)?;
        let range = workbook.worksheet_range("Summary")?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        assert_eq!(
            rows,
            vec![
                vec!["Category", "Count"],
                vec!["Total variants", "2"],
                vec!["Exonic variants", "1"],
                vec!["Rare variants (AF<1%)", "1"],
                vec!["Nonsynonymous SNVs", "1"],
                vec!["Stopgain/Stoploss", "0"],
            ]
        );

        Ok(())
    }

    #[test]
    fn all_variants_sheet() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = write_fixture("tests/report/scenario.clean.csv", &tmp_dir)?;

        let mut workbook: Xlsx<_> = open_workbook(&path)?;
        let range = workbook.worksheet_range("All Variants")?;

        assert_eq!(range.height(), 3);
        assert_eq!(
            range.get_value((0, 6)),
            Some(&Data::String("ExAC_AF".to_string()))
        );
        assert_eq!(range.get_value((1, 1)), Some(&Data::Float(100.0)));
        assert_eq!(
            range.get_value((1, 4)),
            Some(&Data::String("nonsynonymous_SNV".to_string()))
        );
        assert_eq!(range.get_value((1, 6)), Some(&Data::Float(0.005)));
        // the missing-value token is kept as text, the derived column is blank
        assert_eq!(range.get_value((2, 5)), Some(&Data::String(".".to_string())));
        assert_eq!(range.get_value((2, 6)), Some(&Data::Empty));

        Ok(())
    }

    #[test]
    fn subset_sheets() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = write_fixture("tests/report/annotated.clean.csv", &tmp_dir)?;

        let mut workbook: Xlsx<_> = open_workbook(&path)?;
        let exonic = workbook.worksheet_range("Exonic Variants")?;
        let rare = workbook.worksheet_range("Rare Variants (AF<1%)")?;

        // header plus four rows each
        assert_eq!(exonic.height(), 5);
        assert_eq!(rare.height(), 5);
        assert_eq!(
            rare.get_value((2, 6)),
            Some(&Data::String("VHL".to_string()))
        );

        Ok(())
    }
}
