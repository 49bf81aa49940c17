use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_table_sort::{
    sink, BoxedError, ColumnType, Direction, ExternalSorterBuilder, MissingOrder, Row, Schema, SortColumn,
    SortKey, SortSpec,
};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let missing: Missing = arg_parser.value_of_t_or_exit("missing");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let has_header = arg_parser.is_present("header");
    let delimiter: char = arg_parser.value_of_t_or_exit("delimiter");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let max_rows: Option<usize> = arg_parser
        .is_present("max_rows")
        .then(|| arg_parser.value_of_t_or_exit("max_rows"));
    let max_open: Option<usize> = arg_parser
        .is_present("max_open")
        .then(|| arg_parser.value_of_t_or_exit("max_open"));

    let types = arg_parser.value_of("types").expect("value is required");
    let types = match types.split(',').map(|t| t.trim().parse::<ColumnType>()).collect::<Result<Vec<_>, _>>() {
        Ok(types) => types,
        Err(err) => {
            log::error!("column types error: {}", err);
            process::exit(2);
        }
    };

    if !delimiter.is_ascii() {
        log::error!("delimiter must be a single ASCII character, got '{}'", delimiter);
        process::exit(2);
    }
    let delimiter = delimiter as u8;

    let input = arg_parser.value_of("input").expect("value is required");
    let mut reader = match csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_header)
        .from_path(input)
    {
        Ok(reader) => reader,
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let schema = match has_header {
        true => match reader.headers() {
            Ok(header) if header.is_empty() => Schema::from_types(types.iter().copied()),
            Ok(header) => {
                if header.len() != types.len() {
                    log::error!("header has {} columns, {} types given", header.len(), types.len());
                    process::exit(2);
                }
                Schema::new(
                    header
                        .iter()
                        .zip(types.iter())
                        .map(|(name, ty)| ext_table_sort::ColumnSpec::new(name, *ty))
                        .collect(),
                )
            }
            Err(err) => {
                log::error!("header reading error: {}", err);
                process::exit(1);
            }
        },
        false => Schema::from_types(types.iter().copied()),
    };

    let keys = match arg_parser
        .values_of("key")
        .map(|keys| keys.map(|key| parse_key(key, &schema)).collect::<Result<Vec<_>, _>>())
        .unwrap_or_else(|| Ok(Vec::new()))
    {
        Ok(keys) => keys,
        Err(err) => {
            log::error!("sort key error: {}", err);
            process::exit(2);
        }
    };

    let selection = match arg_parser.value_of("select").map(|columns| {
        columns
            .split(',')
            .map(|column| resolve_column(column.trim(), &schema))
            .collect::<Result<Vec<_>, _>>()
    }) {
        Some(Ok(columns)) => Some(columns),
        Some(Err(err)) => {
            log::error!("column selection error: {}", err);
            process::exit(2);
        }
        None => None,
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut writer = match csv::WriterBuilder::new().delimiter(delimiter).from_path(output) {
        Ok(writer) => writer,
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut sorter_builder = ExternalSorterBuilder::new().with_missing_order(match missing {
        Missing::Smallest => MissingOrder::Smallest,
        Missing::Largest => MissingOrder::Largest,
    });
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }
    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }
    if let Some(max_rows) = max_rows {
        sorter_builder = sorter_builder.with_max_rows_per_container(max_rows);
    }
    if let Some(max_open) = max_open {
        sorter_builder = sorter_builder.with_max_open_containers(max_open);
    }
    if let Some(batch_size) = arg_parser.value_of("batch_size") {
        sorter_builder = sorter_builder
            .with_max_batch_bytes(batch_size.parse::<ByteSize>().expect("value is pre-validated").as_u64());
    }

    let mut sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let rows = reader
        .into_records()
        .enumerate()
        .map(|(idx, record)| -> Result<Row, RecordError> {
            let record = record.map_err(RecordError::Csv)?;
            let line = record.position().map(|pos| pos.line()).unwrap_or_default();
            parse_record(idx as u64, &record, &schema).map_err(|err| RecordError::Format(line, err))
        });

    let output_schema = match &selection {
        Some(columns) => ext_table_sort::Projection::new(&schema, columns).map(|p| p.schema().clone()),
        None => Ok(schema.clone()),
    };
    if has_header {
        if let Ok(output_schema) = &output_schema {
            if let Err(err) = writer.write_record(output_schema.columns().iter().map(|c| c.name.as_str())) {
                log::error!("data saving error: {}", err);
                process::exit(1);
            }
        }
    }

    let mut row_writer = sink::from_fn(|row: Row| -> Result<(), BoxedError> {
        write_row(&mut writer, &row)?;
        Ok(())
    });

    let spec = SortSpec::new(keys);
    let result = match &selection {
        Some(columns) => sorter.sort_projected(&schema, rows, columns, &spec, &mut row_writer),
        None => sorter.sort(&schema, rows, &spec, &mut row_writer),
    };

    match result {
        Ok(summary) => log::info!("{} rows written to {}", summary.output_rows, output),
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }

    if let Err(err) = writer.flush() {
        log::error!("data flushing error: {}", err);
        process::exit(1);
    }
}

#[derive(Debug)]
enum RecordError {
    Csv(csv::Error),
    Format(u64, String),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Csv(err) => write!(f, "read error: {}", err),
            RecordError::Format(line, err) => write!(f, "line {}: {}", line, err),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RecordError::Csv(err) => Some(err),
            RecordError::Format(..) => None,
        }
    }
}

fn parse_record(key: u64, record: &csv::StringRecord, schema: &Schema) -> Result<Row, String> {
    if record.len() != schema.width() {
        return Err(format!("{} fields, expected {}", record.len(), schema.width()));
    }

    let cells = record
        .iter()
        .zip(schema.columns())
        .map(|(field, column)| column.column_type.parse(field))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Row::new(key, cells))
}

fn write_row<W: io::Write>(writer: &mut csv::Writer<W>, row: &Row) -> csv::Result<()> {
    writer.write_record(row.cells.iter().map(|cell| cell.to_string()))
}

/// Resolves a column given by position or, with a header, by name.
fn resolve_column(column: &str, schema: &Schema) -> Result<usize, String> {
    if let Ok(idx) = column.parse::<usize>() {
        return Ok(idx);
    }
    schema
        .index_of(column)
        .ok_or_else(|| format!("unknown column '{}'", column))
}

/// Parses `<column>[:asc|:desc]`, where `<column>` may also be `rowkey`.
fn parse_key(key: &str, schema: &Schema) -> Result<SortKey, String> {
    let (column, direction) = match key.rsplit_once(':') {
        Some((column, "asc")) => (column, Direction::Ascending),
        Some((column, "desc")) => (column, Direction::Descending),
        Some((_, other)) => return Err(format!("unknown direction '{}'", other)),
        None => (key, Direction::Ascending),
    };

    let column = match column {
        "rowkey" => SortColumn::RowKey,
        column => SortColumn::Cell(resolve_column(column, schema)?),
    };

    Ok(SortKey { column, direction })
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Missing {
    Smallest,
    Largest,
}

impl Missing {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Missing::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Missing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Missing as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-table-sort")
        .about("external multi-key sorter for delimited tables")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("types")
                .short('T')
                .long("types")
                .help("comma separated column types (bool, int, double, text)")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("key")
                .short('k')
                .long("key")
                .help("sort key <column>[:asc|:desc], column by position, name or 'rowkey'")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            clap::Arg::new("select")
                .short('s')
                .long("select")
                .help("comma separated columns to keep; sort keys refer to this selection")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("header")
                .long("header")
                .help("first line holds column names"),
        )
        .arg(
            clap::Arg::new("delimiter")
                .long("delimiter")
                .help("field delimiter")
                .takes_value(true)
                .default_value(","),
        )
        .arg(
            clap::Arg::new("missing")
                .long("missing")
                .help("where missing values sort")
                .takes_value(true)
                .default_value("smallest")
                .possible_values(Missing::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel batch sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("max_rows")
                .long("max-rows")
                .help("maximum number of rows per run")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("max_open")
                .long("max-open")
                .help("maximum number of runs merged at once")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("batch_size")
                .short('c')
                .long("batch-size")
                .help("maximum memory of an in-memory batch")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Batch size format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
