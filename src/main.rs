//! heapdb - inspect and fill single-table heap files

use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use heapdb::access::{Column, Field, HeapFile, Row, Schema, Type};
use heapdb::catalog::Catalog;
use heapdb::config::{DEFAULT_PAGE_SIZE, StorageConfig};
use heapdb::executor::{Aggregate, AggregateOp, RowStream, SeqScan};
use heapdb::storage::BufferPool;
use heapdb::storage::page::heap_page::slot_count;
use heapdb::transaction::TransactionIdGenerator;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// heapdb - a slotted-page heap file tool
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Page size in bytes for newly created files
    #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty heap file
    Create {
        #[arg(short, long)]
        file: PathBuf,
        /// Column list, e.g. `id:int,name:text`
        #[arg(short, long)]
        columns: String,
    },
    /// Insert one row per `--values` argument
    Insert {
        #[arg(short, long)]
        file: PathBuf,
        /// Comma-separated field values in column order
        #[arg(short, long, required = true)]
        values: Vec<String>,
    },
    /// Print every row
    Scan {
        #[arg(short, long)]
        file: PathBuf,
        /// Qualify column names as `alias.column`
        #[arg(short, long, default_value = "t")]
        alias: String,
    },
    /// Print file layout statistics
    Info {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Reduce one column, optionally grouped by another
    Aggregate {
        #[arg(short, long)]
        file: PathBuf,
        /// COUNT, SUM, AVG, MIN or MAX
        #[arg(short, long)]
        op: String,
        #[arg(long)]
        value_column: usize,
        #[arg(long)]
        group_by: Option<usize>,
    },
}

/// Contents of the `<file>.schema` sidecar.
#[derive(Debug, Serialize, Deserialize)]
struct TableMeta {
    page_size: usize,
    schema: Schema,
}

fn meta_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".schema");
    PathBuf::from(name)
}

fn parse_columns(list: &str) -> Result<Schema> {
    let columns = list
        .split(',')
        .map(|col| {
            let (name, ty) = col
                .split_once(':')
                .with_context(|| format!("Column '{}' is not name:type", col))?;
            let field_type = match ty.trim().to_ascii_lowercase().as_str() {
                "int" => Type::Int,
                "text" => Type::Text,
                other => bail!("Unknown column type '{}'", other),
            };
            Ok(Column::new(name.trim(), field_type))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::from_columns(columns)?)
}

fn parse_row(schema: &Arc<Schema>, line: &str) -> Result<Row> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != schema.num_fields() {
        bail!(
            "Expected {} values, got {} in '{}'",
            schema.num_fields(),
            parts.len(),
            line
        );
    }
    let fields = parts
        .iter()
        .zip(schema.field_types())
        .map(|(raw, ty)| match ty {
            Type::Int => raw
                .trim()
                .parse::<i32>()
                .map(Field::Int)
                .with_context(|| format!("'{}' is not an INT", raw)),
            Type::Text => Ok(Field::text(raw)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::from_fields(Arc::clone(schema), fields)?)
}

/// An opened heap file together with the collaborators it needs.
struct Table {
    catalog: Arc<Catalog>,
    file: Arc<HeapFile>,
    pool: BufferPool,
}

impl Table {
    fn open(path: &Path) -> Result<Self> {
        let meta_path = meta_path(path);
        let bytes = std::fs::read(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        let meta: TableMeta = bincode::deserialize(&bytes).context("Corrupt schema sidecar")?;
        debug!("loaded schema [{}] from {}", meta.schema, meta_path.display());

        let config = StorageConfig::with_page_size(meta.page_size);
        let file = Arc::new(
            HeapFile::open(path, Arc::new(meta.schema), &config)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        );
        let catalog = Arc::new(Catalog::new());
        catalog.add_table(Arc::clone(&file), "t");
        let pool = BufferPool::new(Arc::clone(&catalog), config.buffer_pool_pages);
        Ok(Self {
            catalog,
            file,
            pool,
        })
    }
}

fn create(path: &Path, columns: &str, page_size: usize) -> Result<()> {
    let schema = parse_columns(columns)?;
    if slot_count(page_size, schema.byte_size()) == 0 {
        bail!(
            "A {}-byte row does not fit in a {}-byte page",
            schema.byte_size(),
            page_size
        );
    }
    std::fs::write(path, b"").with_context(|| format!("Failed to create {}", path.display()))?;
    let meta = TableMeta { page_size, schema };
    std::fs::write(meta_path(path), bincode::serialize(&meta)?)?;
    info!("created {} with schema [{}]", path.display(), meta.schema);
    println!("Created {} ({})", path.display(), meta.schema);
    Ok(())
}

fn insert(path: &Path, values: &[String]) -> Result<()> {
    let table = Table::open(path)?;
    let txns = TransactionIdGenerator::new();
    let txn = txns.next_id();

    for line in values {
        let mut row = parse_row(table.file.schema(), line)?;
        let result = table.file.insert_row(&table.pool, txn, &mut row);
        if let Err(e) = result {
            table.pool.transaction_complete(txn, false)?;
            return Err(e).with_context(|| format!("Failed to insert '{}'", line));
        }
    }
    table.pool.transaction_complete(txn, true)?;
    println!("Inserted {} rows", values.len());
    Ok(())
}

fn print_stream(stream: &mut dyn RowStream) -> Result<()> {
    println!("{}", stream.schema());
    stream.open()?;
    let mut count = 0;
    while let Some(row) = stream.next()? {
        println!("{}", row);
        count += 1;
    }
    stream.close();
    println!("({} rows)", count);
    Ok(())
}

fn scan(path: &Path, alias: &str) -> Result<()> {
    let table = Table::open(path)?;
    let txn = TransactionIdGenerator::new().next_id();
    let mut scan = SeqScan::new(&table.catalog, &table.pool, txn, table.file.id(), alias)?;
    print_stream(&mut scan)
}

fn show_info(path: &Path) -> Result<()> {
    let table = Table::open(path)?;
    let file = &table.file;
    let schema = file.schema();
    let txn = TransactionIdGenerator::new().next_id();

    let mut rows = 0;
    let mut scan = file.iterator(&table.pool, txn);
    scan.open()?;
    while scan.next()?.is_some() {
        rows += 1;
    }
    scan.close();

    println!("File:           {}", file.path().display());
    println!("Table id:       {}", file.id());
    println!("Schema:         {}", schema);
    println!("Row size:       {} bytes", schema.byte_size());
    println!("Page size:      {} bytes", file.page_size());
    println!(
        "Slots per page: {}",
        slot_count(file.page_size(), schema.byte_size())
    );
    println!("Pages:          {}", file.page_count()?);
    println!("Rows:           {}", rows);
    Ok(())
}

fn aggregate(path: &Path, op: &str, value_column: usize, group_by: Option<usize>) -> Result<()> {
    let table = Table::open(path)?;
    let op: AggregateOp = op.parse()?;
    let txn = TransactionIdGenerator::new().next_id();
    let child = table.file.iterator(&table.pool, txn);
    let mut agg = Aggregate::new(Box::new(child), value_column, group_by, op)?;
    print_stream(&mut agg)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Create { file, columns } => create(&file, &columns, args.page_size),
        Command::Insert { file, values } => insert(&file, &values),
        Command::Scan { file, alias } => scan(&file, &alias),
        Command::Info { file } => show_info(&file),
        Command::Aggregate {
            file,
            op,
            value_column,
            group_by,
        } => aggregate(&file, &op, value_column, group_by),
    }
}
