use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use std::{env, process};

use align_compare::formats::{self, FileSource};
use align_compare::utils;
use align_compare::{AlignCompare, CompareParams, CompareStats, Mode, RowComparison};

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start_time = Instant::now();

    let config = Config::new();

    for filename in [&config.set1, &config.set2] {
        if !utils::file_exists(filename) {
            return Err(format!("Input file {} does not exist", filename.display()));
        }
    }
    if config.progress {
        for filename in [&config.set1, &config.set2] {
            let size = utils::file_size(filename).unwrap_or(String::from("unknown"));
            eprintln!("Input {}: {}", filename.display(), size);
        }
    }

    let set1 = FileSource::new(&config.set1)?;
    let set2 = FileSource::new(&config.set2)?;
    let mut compare = AlignCompare::new(Box::new(set1), Box::new(set2), config.params.clone())?;

    if config.split {
        if config.progress {
            eprintln!("Collecting span boundaries");
        }
        compare.populate_boundaries_map()?;
    }

    let mut output: Box<dyn Write> = if config.output == PathBuf::from("-") {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(&config.output).map_err(|x| x.to_string())?;
        Box::new(BufWriter::new(file))
    };

    let mut group_num = 0;
    while !compare.end_of_data() {
        let group = compare.next_group()?;
        if group.is_empty() {
            continue;
        }
        group_num += 1;
        if config.verbose {
            for info in group.iter() {
                let mut line = Vec::new();
                let _ = write!(line, "{}\tset{}\t{}\t", group_num, info.source_set, info.match_level);
                line.extend_from_slice(&formats::record_to_line(&info.record));
                line.push(b'\n');
                output.write_all(&line).map_err(|x| x.to_string())?;
            }
        }
        if config.progress && group_num % 100000 == 0 {
            eprintln!("Processed {} groups", group_num);
        }
    }

    write_report(compare.stats(), &mut output).map_err(|x| x.to_string())?;
    output.flush().map_err(|x| x.to_string())?;

    if config.progress {
        let end_time = Instant::now();
        let seconds = end_time.duration_since(start_time).as_secs_f64();
        eprintln!("Processed {} groups in {:.3} seconds", group_num, seconds);
    }

    Ok(())
}

//-----------------------------------------------------------------------------

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * (part as f64) / (whole as f64)
    }
}

fn write_report<T: Write>(stats: &CompareStats, output: &mut T) -> io::Result<()> {
    writeln!(output, "# alignments: set 1: {}, set 2: {}", stats.count_set1, stats.count_set2)?;
    writeln!(
        output,
        "# compared pieces: set 1: {}, set 2: {}",
        stats.count_split_set1, stats.count_split_set2
    )?;
    writeln!(
        output,
        "# equivalent: set 1: {} ({:.2}%), set 2: {} ({:.2}%), groups: {}",
        stats.count_equiv_set1,
        percent(stats.count_equiv_set1, stats.count_set1),
        stats.count_equiv_set2,
        percent(stats.count_equiv_set2, stats.count_set2),
        stats.count_equiv_groups
    )?;
    writeln!(
        output,
        "# overlapping: set 1: {}, set 2: {}, groups: {}",
        stats.count_overlap_set1, stats.count_overlap_set2, stats.count_overlap_groups
    )?;
    writeln!(
        output,
        "# only in one set: set 1: {}, set 2: {}",
        stats.count_only_set1, stats.count_only_set2
    )?;
    writeln!(
        output,
        "# bases: set 1: {}, set 2: {}",
        stats.count_bases_set1, stats.count_bases_set2
    )?;
    writeln!(
        output,
        "# bases equivalent: set 1: {}, set 2: {}",
        stats.count_bases_equiv_set1, stats.count_bases_equiv_set2
    )?;
    writeln!(
        output,
        "# bases overlapping: set 1: {}, set 2: {}",
        stats.count_bases_overlap_set1, stats.count_bases_overlap_set2
    )?;
    writeln!(
        output,
        "# bases only in one set: set 1: {}, set 2: {}",
        stats.count_bases_only_set1, stats.count_bases_only_set2
    )
}

//-----------------------------------------------------------------------------

struct Config {
    set1: PathBuf,
    set2: PathBuf,
    output: PathBuf,
    params: CompareParams,
    split: bool,
    verbose: bool,
    progress: bool,
}

impl Config {
    pub fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();
        let header = format!("Usage: {} [options] set1.tsv[.gz] set2.tsv[.gz]", program);

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("o", "output", "output file name (default: stdout)", "FILE");
        opts.optopt(
            "m",
            "mode",
            "comparison granularity: 'interval' (default), 'exon', 'span', 'intron', or 'full'",
            "MODE",
        );
        opts.optopt(
            "r",
            "row",
            "rows that must match: 'query', 'subject', or 'both' (default)",
            "ROW",
        );
        opts.optflag("s", "strict", "count only exact equivalence as a match");
        opts.optflag(
            "",
            "ignore-not-present",
            "do not count alignments whose (query, subject) is absent from the other set",
        );
        opts.optopt(
            "",
            "required-scores",
            "comma-separated integer scores that must be present and equal",
            "NAMES",
        );
        opts.optopt(
            "",
            "optional-scores",
            "comma-separated integer scores that block comparison when both are nonzero and differ",
            "NAMES",
        );
        opts.optopt(
            "q",
            "quality-scores",
            "comma-separated integer scores used to pick the better side of an overlap",
            "NAMES",
        );
        opts.optopt(
            "",
            "score-set",
            "comma-separated named scores that participate in equivalence tie-breaking",
            "NAMES",
        );
        opts.optflag("", "blacklist", "treat --score-set as a blacklist");
        opts.optopt(
            "t",
            "tolerance",
            "relative tolerance for real-valued score comparisons (default: 0)",
            "FLOAT",
        );
        opts.optopt(
            "",
            "distributive-scores",
            "comma-separated named scores copied to slices when an alignment is split",
            "NAMES",
        );
        opts.optflag("", "split", "split alignments at span boundaries before comparing");
        opts.optflag("v", "verbose", "write one classification line per alignment");
        opts.optflag("p", "progress", "print progress information to stderr");

        let matches = match opts.parse(&args[1..]) {
            Ok(m) => m,
            Err(f) => {
                eprintln!("{}", f);
                process::exit(1);
            }
        };

        // Parse options.
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        // Parse positional arguments
        if matches.free.len() != 2 {
            eprintln!("Error: Expected 2 positional arguments (first and second alignment set)\n");
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        }
        let set1 = PathBuf::from(&matches.free[0]);
        let set2 = PathBuf::from(&matches.free[1]);

        let output = if let Some(o) = matches.opt_str("o") {
            PathBuf::from(o)
        } else {
            PathBuf::from("-") // Use stdout if no output file is specified
        };

        let mut params = CompareParams::default();

        // Parse mode
        params.mode = if let Some(s) = matches.opt_str("m") {
            match s.to_lowercase().as_str() {
                "interval" => Mode::Interval,
                "exon" => Mode::Exon,
                "span" => Mode::Span,
                "intron" => Mode::Intron,
                "full" => Mode::Full,
                _ => {
                    eprintln!(
                        "Error: Invalid mode '{}'. Must be 'interval', 'exon', 'span', 'intron', or 'full'",
                        s
                    );
                    process::exit(1);
                }
            }
        } else {
            Mode::Interval
        };

        // Parse row comparison
        params.row = if let Some(s) = matches.opt_str("r") {
            match s.to_lowercase().as_str() {
                "query" => RowComparison::Query,
                "subject" => RowComparison::Subject,
                "both" => RowComparison::Both,
                _ => {
                    eprintln!("Error: Invalid row '{}'. Must be 'query', 'subject', or 'both'", s);
                    process::exit(1);
                }
            }
        } else {
            RowComparison::Both
        };

        // Parse tolerance
        params.real_score_tolerance = if let Some(s) = matches.opt_str("t") {
            match s.parse::<f64>() {
                Ok(x) => x,
                Err(e) => {
                    eprintln!("Error: Failed to parse --tolerance: {}", e);
                    process::exit(1);
                }
            }
        } else {
            0.0
        };

        params.required_scores = name_list(matches.opt_str("required-scores"));
        params.optional_scores = name_list(matches.opt_str("optional-scores"));
        params.quality_scores = name_list(matches.opt_str("q"));
        params.score_set = name_set(matches.opt_str("score-set"));
        params.score_set_as_blacklist = matches.opt_present("blacklist");
        params.distributive_scores = name_set(matches.opt_str("distributive-scores"));
        params.strict = matches.opt_present("s");
        params.ignore_not_present = matches.opt_present("ignore-not-present");

        // Validate options.
        if let Err(message) = params.validate() {
            eprintln!("Error: {}", message);
            process::exit(1);
        }

        Config {
            set1,
            set2,
            output,
            params,
            split: matches.opt_present("split"),
            verbose: matches.opt_present("v"),
            progress: matches.opt_present("p"),
        }
    }
}

fn name_list(value: Option<String>) -> Vec<String> {
    match value {
        Some(names) => names
            .split(',')
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect(),
        None => Vec::new(),
    }
}

fn name_set(value: Option<String>) -> BTreeSet<String> {
    name_list(value).into_iter().collect()
}

//-----------------------------------------------------------------------------
