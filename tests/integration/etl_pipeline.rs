//! Archive → reconciled CSV → valuation loader, on real files

use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;
use test_log::test;

use crate::common::fixtures::{healthy_company, line, line_on, raw_table, ArchiveBuilder};
use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use eva_valuation::analysis::metrics::{accounts, latest_estimate_series, latest_value};
use eva_valuation::etl::archive::ReportScope;
use eva_valuation::etl::{run_update, MemorySource, StatementReconciler, YearTables, ZipArchiveSource};
use eva_valuation::models::StatementType;
use eva_valuation::statements::loader::statement_table_from_raw;
use eva_valuation::statements::{load_financial_statements, load_statement_table, StatementTable};
use eva_valuation::utils::RawTable;

const DRE: StatementType = StatementType::IncomeStatement;
const CON: ReportScope = ReportScope::Consolidated;
const IND: ReportScope = ReportScope::Individual;

/// Two yearly archives:
/// - 9999 is in both scopes in 2023 with different values, consolidated only in 2024
/// - 2002 reports individually only, in 2024, with a reordered header
/// - 1234 is not in the mapping
fn write_archives(dir: &Path) {
    ArchiveBuilder::new()
        .member(
            DRE,
            CON,
            2023,
            &[
                line_on("2023-12-31", 9999, accounts::EBIT, 500.0),
                line_on("2023-12-31", 9999, accounts::PRE_TAX_INCOME, 450.5),
                line_on("2023-12-31", 1234, accounts::EBIT, 77.0),
            ],
        )
        .member(
            DRE,
            IND,
            2023,
            &[
                line_on("2023-12-31", 9999, accounts::EBIT, 999.0),
                line_on("2023-12-31", 9999, accounts::INCOME_TAX, -1.0),
            ],
        )
        .member(
            StatementType::AssetBalance,
            CON,
            2023,
            &[line_on("2023-12-31", 9999, accounts::NON_CURRENT_ASSETS, 4_000.0)],
        )
        .write(dir, 2023);

    // 9999 also shows up individually here and must still be suppressed
    ArchiveBuilder::new()
        .member(DRE, CON, 2024, &[line(9999, accounts::EBIT, 600.0)])
        .raw(
            DRE,
            IND,
            2024,
            "VL_CONTA;CD_CONTA;ORDEM_EXERC;DT_REFER;CD_CVM\n\
             300.25;3.05;ÚLTIMO;2024-12-31;2002\n\
             123;3.05;ÚLTIMO;2024-12-31;9999\n",
        )
        .write(dir, 2024);
}

fn filter() -> HashSet<i64> {
    [9999, 2002].into_iter().collect()
}

fn latest_ebit(table: &StatementTable, code: i64) -> f64 {
    latest_value(table.company_rows(code), accounts::EBIT)
}

#[test]
fn test_consolidated_rows_win_per_entity_and_year() {
    init_test_logging();
    log_test_step("Running the ETL over two archives");

    let archives = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_archives(archives.path());

    let reconciler = StatementReconciler::new(ZipArchiveSource::new(archives.path()));
    let summary = run_update(&reconciler, &StatementType::all(), 2023..=2025, &filter(), output.path());
    log_test_data("summary", &summary);

    // DRE and BPA have rows; BPP and DFC_MI are soft failures with empty outputs
    assert_eq!(summary.generated(), 2);
    assert_eq!(summary.attempted(), 4);
    assert!(summary.is_success());
    assert!(!summary.is_complete());

    let dre = load_statement_table(&output.path().join("dre_consolidated.csv")).unwrap();
    let ebit_9999: Vec<f64> = latest_estimate_series(dre.company_rows(9999), accounts::EBIT)
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(ebit_9999, vec![500_000.0, 600_000.0]);

    // individual-only income tax line of 9999 in 2023 is suppressed with the rest
    assert_eq!(latest_value(dre.company_rows(9999), accounts::INCOME_TAX), 0.0);

    // fallback rows are realigned to the first header
    assert_eq!(latest_ebit(&dre, 2002), 300_250.0);
    assert!(dre.company_rows(1234).is_empty());

    let bpp_path = output.path().join("bpp_consolidated.csv");
    assert!(bpp_path.exists());
    assert_eq!(std::fs::read_to_string(&bpp_path).unwrap(), "");
}

#[test]
fn test_empty_required_table_blocks_the_valuation_loader() {
    let archives = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_archives(archives.path());

    let reconciler = StatementReconciler::new(ZipArchiveSource::new(archives.path()));
    run_update(&reconciler, &StatementType::all(), 2023..=2024, &filter(), output.path());

    assert!(load_financial_statements(output.path()).is_err());
}

#[test]
fn test_written_table_round_trips_through_the_loader() {
    let archives = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_archives(archives.path());

    let reconciler = StatementReconciler::new(ZipArchiveSource::new(archives.path()));
    let in_memory = reconciler.reconcile(DRE, 2023..=2024, &filter()).unwrap();
    let in_memory = statement_table_from_raw(
        &RawTable::new(in_memory.headers.clone().unwrap(), in_memory.records.clone()),
        Path::new("in-memory"),
    )
    .unwrap();

    let path = output.path().join(DRE.output_file_name());
    reconciler.reconcile_to_file(DRE, 2023..=2024, &filter(), &path).unwrap();
    let reloaded = load_statement_table(&path).unwrap();

    assert_eq!(in_memory.len(), reloaded.len());
    for code in filter() {
        for account in [accounts::EBIT, accounts::PRE_TAX_INCOME, accounts::INCOME_TAX] {
            let before = latest_value(in_memory.company_rows(code), account);
            let after = latest_value(reloaded.company_rows(code), account);
            assert!((before - after).abs() < 1e-6, "{} {}: {} vs {}", code, account, before, after);
        }
    }
}

#[test]
fn test_cash_flow_without_mapped_rows_does_not_block_loading() {
    init_test_logging();
    log_test_step("Statements for 9999, cash flow only for an unmapped company");

    let mut source = MemorySource::new();
    for (statement_type, lines) in healthy_company(9999) {
        source.insert(
            statement_type,
            2024,
            YearTables {
                consolidated: Some(raw_table(&lines)),
                individual: None,
            },
        );
    }
    source.insert(
        StatementType::CashFlow,
        2024,
        YearTables {
            consolidated: Some(raw_table(&[line(1234, "6.01", 10.0)])),
            individual: None,
        },
    );

    let output = TempDir::new().unwrap();
    let reconciler = StatementReconciler::new(source);
    let summary = run_update(&reconciler, &StatementType::all(), 2024..=2024, &filter(), output.path());
    assert_eq!(summary.generated(), 3);
    assert_eq!(summary.attempted(), 4);

    let cash_flow = std::fs::read_to_string(output.path().join(StatementType::CashFlow.output_file_name())).unwrap();
    assert_eq!(cash_flow.lines().count(), 1);
    assert!(cash_flow.starts_with("CD_CVM,"));

    let statements = load_financial_statements(output.path()).unwrap();
    assert!(statements.table(StatementType::CashFlow).unwrap().is_empty());
    assert_eq!(latest_ebit(statements.table(DRE).unwrap(), 9999), 1_000_000.0);
}
