//! CLI: извлекает операции из выписок и выводит сводку или JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rust_decimal::Decimal;
use statement_import::{AMOUNT_DECIMALS, ExtractorBuilder, ImportBatch, Item, SecurityRegistry};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Извлечение операций из текстовых и PDF-выписок.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Файлы выписок или каталоги с ними.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Вывести элементы и ошибки в формате JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Подробный журнал в stderr (уровень debug).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Разбирать только указанные учреждения (можно повторять).
    #[arg(long, value_name = "LABEL")]
    only: Vec<String>,

    /// Пропускать операции с нулевой суммой.
    #[arg(long, default_value_t = false)]
    skip_empty: bool,
}

// Журнал идёт в stderr и фильтруется переменной TRACE, например `TRACE=statement_import=debug`.
fn setup_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("TRACE").unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_summary(batch: &ImportBatch, registry: &SecurityRegistry) {
    for extraction in &batch.extractions {
        println!(
            "{}: {}, элементов {}, ошибок {}",
            extraction.file_name,
            extraction.institution.as_deref().unwrap_or("не распознано"),
            extraction.items.len(),
            extraction.errors.len()
        );
    }

    for item in batch.items() {
        match item {
            Item::Security { id, security } => {
                println!(
                    "  бумага #{}: {} ({})",
                    id.0,
                    security.name,
                    security.isin.as_deref().unwrap_or("-")
                );
            }
            Item::Transaction(tx) => {
                let security = tx
                    .security
                    .and_then(|id| registry.get(id))
                    .map_or("", |s| s.name.as_str());
                println!("  {} {} {} {security}", tx.date, tx.kind, tx.amount);
            }
        }
    }

    let errors: Vec<_> = batch.errors().collect();
    if !errors.is_empty() {
        println!("Ошибки:");
        for err in errors {
            println!("  {err}");
        }
    }

    println!("Итоги:");
    for total in batch.totals() {
        println!(
            "  {:<16} {} {:>14} ({} шт.)",
            total.kind,
            total.currency,
            Decimal::new(total.amount, AMOUNT_DECIMALS),
            total.count
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let mut builder = ExtractorBuilder::new().skip_empty(cli.skip_empty);
    if !cli.only.is_empty() {
        builder = builder.only(&cli.only);
    }
    let extractor = match builder.build() {
        Ok(extractor) => extractor,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut registry = SecurityRegistry::new();
    let batch = ImportBatch::from_paths(&cli.paths, &extractor, &mut registry);

    if cli.json {
        let items: Vec<&Item> = batch.items().collect();
        let errors: Vec<String> = batch.errors().map(ToString::to_string).collect();
        let output = serde_json::json!({ "items": items, "errors": errors });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&batch, &registry);
    }

    // Ненулевой код только для непрочитанных файлов; ошибки блоков уже в выводе.
    if batch.unreadable().next().is_some() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
