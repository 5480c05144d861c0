use clap::{Arg, ArgAction, Command, value_parser};
use clap_num::maybe_hex;
use exhume_body::{Body, BodySlice};
use exhume_cfb::{CompoundFile, StreamResult, extract_to};
use log::{debug, error, info};
use serde_json::{Value, json};
use std::io::{Read, Seek};
use std::path::Path;

struct Options {
    show_header: bool,
    list: bool,
    entry_id: Option<u32>,
    dump: bool,
    extract: Option<String>,
    json_output: bool,
}

fn main() {
    let matches = Command::new("exhume_cfb")
        .version("0.1.0")
        .author("ForensicXlab")
        .about("Exhume the streams from a compound file (OLE2 / CFB) container.")
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_parser(value_parser!(String))
                .required(true)
                .help("The path to the body to exhume."),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(value_parser!(String))
                .required(false)
                .help("The format of the file, either 'raw' or 'ewf'."),
        )
        .arg(
            Arg::new("offset")
                .short('o')
                .long("offset")
                .value_parser(maybe_hex::<u64>)
                .default_value("0")
                .help("The compound file starts at address (decimal or hex)."),
        )
        .arg(
            Arg::new("size")
                .short('s')
                .long("size")
                .value_parser(maybe_hex::<u64>)
                .required(false)
                .help("The size of the compound file in sectors (decimal or hex)."),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .action(ArgAction::SetTrue)
                .help("Display the compound file header."),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List every decoded directory entry."),
        )
        .arg(
            Arg::new("entry")
                .long("entry")
                .value_parser(maybe_hex::<u32>)
                .help("Display the metadata about a specific entry identifier."),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .action(ArgAction::SetTrue)
                .requires("entry")
                .help("Dump the stream content to entry_<ID>.bin (requires --entry)"),
        )
        .arg(
            Arg::new("extract")
                .long("extract")
                .value_parser(value_parser!(String))
                .help("Write every stream into the given directory."),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output certain structures (header, list, entry) in JSON format."),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set the log verbosity level"),
        )
        .get_matches();

    // Initialize logger.
    let log_level_str = matches.get_one::<String>("log_level").unwrap();
    let level_filter = match log_level_str.as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new().filter_level(level_filter).init();

    let file_path = matches.get_one::<String>("body").unwrap();
    let auto = String::from("auto");
    let format = matches.get_one::<String>("format").unwrap_or(&auto);
    let offset = *matches.get_one::<u64>("offset").unwrap();
    let size = matches.get_one::<u64>("size").copied();
    let opts = Options {
        show_header: matches.get_flag("header"),
        list: matches.get_flag("list"),
        entry_id: matches.get_one::<u32>("entry").copied(),
        dump: matches.get_flag("dump"),
        extract: matches.get_one::<String>("extract").cloned(),
        json_output: matches.get_flag("json"),
    };

    let mut body = Body::new(file_path.to_owned(), format);
    debug!("Created Body from '{}'", file_path);

    match size {
        Some(size) => {
            let container_size = size * body.get_sector_size() as u64;
            match BodySlice::new(&mut body, offset, container_size) {
                Ok(slice) => run(slice, &opts),
                Err(e) => error!("Could not create BodySlice: {}", e),
            }
        }
        None if offset == 0 => run(&mut body, &opts),
        None => error!("--size is required when --offset is not 0"),
    }
}

fn run<T: Read + Seek>(body: T, opts: &Options) {
    let mut file = match CompoundFile::new(body) {
        Ok(f) => f,
        Err(e) => {
            error!("Couldn't open the compound file: {}", e);
            return;
        }
    };

    if opts.show_header {
        if opts.json_output {
            match serde_json::to_string_pretty(&file.header.to_json()) {
                Ok(s) => println!("{}", s),
                Err(e) => error!("Error serializing header to JSON: {}", e),
            }
        } else {
            println!("{}", file.header.to_string());
        }
    }

    if !opts.list && opts.entry_id.is_none() && opts.extract.is_none() {
        return;
    }

    let results = match file.read_all() {
        Ok(r) => r,
        Err(e) => {
            error!("Decoding failed: {}", e);
            return;
        }
    };

    if opts.list {
        if opts.json_output {
            let arr: Vec<Value> = results.iter().map(|r| r.entry.to_json()).collect();
            match serde_json::to_string_pretty(&json!({ "entries": arr })) {
                Ok(s) => println!("{}", s),
                Err(e) => error!("Error serializing entries to JSON: {}", e),
            }
        } else {
            for r in &results {
                println!("{}", r.entry);
            }
        }
    }

    if let Some(id) = opts.entry_id {
        match results.iter().find(|r| r.entry.id == id) {
            Some(result) if opts.dump => dump(result),
            Some(result) => {
                if opts.json_output {
                    println!("{}", result.entry.to_json());
                } else {
                    println!("{}", result.entry.to_table());
                }
            }
            None => error!("No entry with identifier {}", id),
        }
    }

    if let Some(dir) = &opts.extract {
        match extract_to(&results, Path::new(dir)) {
            Ok(paths) => info!("Extracted {} stream(s) to {}", paths.len(), dir),
            Err(e) => error!("Extraction failed: {}", e),
        }
    }
}

fn dump(result: &StreamResult) {
    let Some(data) = result.content() else {
        error!("Entry {} has no stream content to dump", result.entry.id);
        return;
    };
    let out_name = format!("entry_{}.bin", result.entry.id);
    if let Err(e) = std::fs::write(&out_name, data) {
        error!("Cannot write dump: {}", e);
    } else {
        println!("Dumped {} bytes to {}", data.len(), out_name);
    }
}
