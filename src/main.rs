use colored::*;
use colvm::{
    Direction, Filter, FilterOp, Interpreter, Operand, Program, QueryPlanner, QueryResult,
    QuerySpec, Schema, SortKey, Table, Value,
};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// rows printed at most, whatever the query returns
const MAX_PRINTED_ROWS: usize = 50;

/// usage: colvm [file.csv] [filter]... [--order col[:desc]]... [--distinct col,...]
///              [--limit n] [--offset n]
/// a filter is "col op value" with op one of = != < <= > >= in glob regex,
/// or "col is null" / "col is not null"; `in` takes a comma separated list
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, query_args) = match args.first() {
        Some(first) if first.ends_with(".csv") => (first.clone(), &args[1..]),
        _ => ("data.csv".to_string(), &args[..]),
    };
    let total_start = Instant::now();

    println!("{}", "=== LOADING ===".bright_cyan().bold());
    let load_start = Instant::now();
    let table = match Table::from_csv(&path) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("{}", format!("Failed to load {}: {}", path, e).red().bold());
            return ExitCode::FAILURE;
        }
    };
    let schema = table.schema();
    println!(
        "{} {}",
        format!("Loaded {}", path).green().bold(),
        format!("({})", format_duration(load_start.elapsed())).bright_black()
    );
    for (index, column) in schema.columns.iter().enumerate() {
        let sorted = if column.is_searchable() { " sorted" } else { "" };
        let nullable = if column.nullable { " nullable" } else { "" };
        println!("  [{}] {} ({}{}{})", index, column.name, column.kind, nullable, sorted);
    }

    let spec = if query_args.is_empty() {
        default_query(&schema)
    } else {
        parse_query(&schema, query_args)
    };
    let spec = match spec {
        Ok(spec) => spec,
        Err(message) => {
            eprintln!("{}", message.red().bold());
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!("{}", "=== COMPILING ===".bright_cyan().bold());
    let planner = QueryPlanner::default();
    let compile_start = Instant::now();
    let program = match planner.compile(&schema, &spec) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", format!("Compilation failed: {}", e).red().bold());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "{} {}",
        "Compilation successful".green().bold(),
        format!("({})", format_duration(compile_start.elapsed())).bright_black()
    );
    print_program(&program);

    println!();
    println!("{}", "=== EXECUTION ===".bright_cyan().bold());
    let interpreter = Interpreter::new(planner.config());
    let exec_start = Instant::now();
    let result = match interpreter.execute(&program, &table) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", format!("Execution failed: {}", e).red().bold());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "{} {}",
        "Execution successful".green().bold(),
        format!("({})", format_duration(exec_start.elapsed())).bright_black()
    );
    println!();

    print_results(&table, &result);

    println!();
    println!(
        "{} {}",
        "Total time:".bright_magenta().bold(),
        format_duration(total_start.elapsed()).bright_magenta()
    );
    ExitCode::SUCCESS
}

/// something sensible for the usual demo data: age > 50, oldest first
fn default_query(schema: &Schema) -> Result<QuerySpec, String> {
    let mut spec = QuerySpec::new().limit(10);
    if let Some(age) = schema.index_of("age") {
        spec = spec.filter(Filter::gt(age, 50)).order_by(SortKey::desc(age));
    }
    println!();
    println!(
        "{} {}",
        "Query:".bright_cyan().bold(),
        "(default) age > 50 --order age:desc --limit 10".bright_white()
    );
    Ok(spec)
}

fn parse_query(schema: &Schema, args: &[String]) -> Result<QuerySpec, String> {
    let column = |name: &str| {
        schema
            .index_of(name)
            .ok_or_else(|| format!("unknown column '{}'", name))
    };
    let number = |flag: &str, value: Option<&String>| -> Result<usize, String> {
        value
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| format!("{} expects a number", flag))
    };

    println!();
    println!("{} {}", "Query:".bright_cyan().bold(), args.join(" ").bright_white());

    let mut spec = QuerySpec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--order" => {
                let key = iter.next().ok_or("--order expects a column")?;
                let (name, direction) = match key.split_once(':') {
                    Some((name, "desc")) => (name, Direction::Descending),
                    Some((name, "asc")) => (name, Direction::Ascending),
                    Some((_, other)) => return Err(format!("unknown direction '{}'", other)),
                    None => (key.as_str(), Direction::Ascending),
                };
                spec = spec.order_by(SortKey {
                    column: column(name)?,
                    direction,
                });
            }
            "--distinct" => {
                let names = iter.next().ok_or("--distinct expects columns")?;
                let columns = names
                    .split(',')
                    .map(|n| column(n.trim()))
                    .collect::<Result<Vec<_>, _>>()?;
                spec = spec.distinct_on(columns);
            }
            "--limit" => spec = spec.limit(number("--limit", iter.next())?),
            "--offset" => spec = spec.offset(number("--offset", iter.next())?),
            filter => spec = spec.filter(parse_filter(filter, &column)?),
        }
    }
    Ok(spec)
}

fn parse_filter(text: &str, column: &dyn Fn(&str) -> Result<usize, String>) -> Result<Filter, String> {
    let mut parts = text.splitn(3, ' ');
    let (Some(name), Some(op)) = (parts.next(), parts.next()) else {
        return Err(format!("cannot parse filter '{}'", text));
    };
    let rest = parts.next().unwrap_or("").trim();
    let index = column(name)?;

    let op = match op.to_ascii_lowercase().as_str() {
        "=" | "==" => FilterOp::Eq,
        "!=" | "<>" => FilterOp::Ne,
        "<" => FilterOp::Lt,
        "<=" => FilterOp::Le,
        ">" => FilterOp::Gt,
        ">=" => FilterOp::Ge,
        "in" => FilterOp::In,
        "glob" => FilterOp::Glob,
        "regex" | "regexp" => FilterOp::Regex,
        "is" => match rest.to_ascii_lowercase().as_str() {
            "null" => return Ok(Filter::is_null(index)),
            "not null" => return Ok(Filter::is_not_null(index)),
            _ => return Err(format!("cannot parse filter '{}'", text)),
        },
        other => return Err(format!("unknown operator '{}'", other)),
    };
    let operand = match op {
        FilterOp::In => Operand::List(rest.split(',').map(|v| parse_value(v.trim())).collect()),
        FilterOp::Glob | FilterOp::Regex => Operand::Scalar(Value::String(unquote(rest).to_string())),
        _ => Operand::Scalar(parse_value(rest)),
    };
    Ok(Filter::new(index, op, operand))
}

fn parse_value(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(d) = text.parse::<f64>() {
        Value::Double(d)
    } else {
        Value::String(unquote(text).to_string())
    }
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
}

fn print_program(program: &Program) {
    println!(
        "{}",
        format!(
            "; {} registers, output {}",
            program.register_count(),
            program.output()
        )
        .bright_black()
    );
    for (pc, instruction) in program.instructions().iter().enumerate() {
        let text = instruction.to_string();
        let (name, operands) = text.split_at(instruction.name().len().min(text.len()));
        println!(
            "{} {}{}",
            format!("{:>3}:", pc).bright_black(),
            name.bright_yellow(),
            operands.bright_white()
        );
    }
}

fn print_results(table: &Table, result: &QueryResult) {
    if result.row_count == 0 {
        println!("{}", "No results".yellow());
        return;
    }

    println!("{}", "=== RESULTS ===".bright_cyan().bold());
    println!("Total rows: {}", result.row_count.to_string().bright_yellow());

    let mut output = comfy_table::Table::new();
    output
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![Cell::new("row")];
    header.extend(table.column_names().iter().map(Cell::new));
    output.set_header(header);

    for &row in result.as_slice().iter().take(MAX_PRINTED_ROWS) {
        let mut cells = vec![Cell::new(row)];
        cells.extend(table.row(row as usize).into_iter().map(|value| match value {
            Some(Value::String(s)) => Cell::new(s),
            Some(value) => Cell::new(value),
            None => Cell::new("NULL"),
        }));
        output.add_row(cells);
    }
    println!("{}", output);
    if result.row_count > MAX_PRINTED_ROWS {
        println!(
            "{}",
            format!("... {} more rows", result.row_count - MAX_PRINTED_ROWS).bright_black()
        );
    }
}

fn format_duration(duration: std::time::Duration) -> String {
    let micros = duration.as_micros();
    if micros < 1000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.2}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    }
}
