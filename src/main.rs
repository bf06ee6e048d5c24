use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use hmmsuite::{
    Dataset, Error, Evaluation, HmmModel, HmmTrainer, NgramClassifier, Result, Tagger, TrainerOpt,
};

/// Hidden Markov model sequence labeling
#[derive(Debug, Parser)]
#[command(version)]
#[command(propagate_version = true)]
struct Argv {
    /// increase the log level (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict the label of the last state for an observation sequence
    Predict {
        /// read a model from a file (MODEL)
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
        /// output the whole most likely state path
        #[arg(long)]
        path: bool,
        /// observations are alphabet indices rather than symbols
        #[arg(long)]
        indices: bool,
        #[arg(required = true, value_name = "OBS")]
        observations: Vec<String>,
    },
    /// Assign labels to the sequences in the data sets given by files
    Tag {
        /// read a model from a file (MODEL)
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
        /// report the performance of the model on the data
        #[arg(short = 't', long = "test")]
        evaluate: bool,
        /// output the reference labels in the input data
        #[arg(short, long)]
        reference: bool,
        /// output the probability of the label sequences
        #[arg(short, long)]
        probability: bool,
        /// output the marginal probability of items for their predicted label
        #[arg(short = 'i', long)]
        marginal: bool,
        /// suppress tagging results (useful for test mode)
        #[arg(short, long)]
        quiet: bool,
        #[arg(required = true, value_name = "FILE")]
        datasets: Vec<PathBuf>,
    },
    /// Estimate a model from labeled data sets and store it in MODEL
    Train {
        /// write the model to a file (MODEL); `.bson` selects BSON
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
        /// use the data set with this index (0-based) as holdout data
        #[arg(short = 'e', long)]
        holdout: Option<usize>,
        /// set a training parameter, e.g. smoothing=0.5
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
        parameters: Vec<String>,
        #[arg(required = true, value_name = "FILE")]
        datasets: Vec<PathBuf>,
    },
    /// Output the model stored in the file (MODEL) as JSON
    Dump {
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
    },
    /// Classify a message with a bigram intent model
    Classify {
        /// read intents and their examples from a JSON file
        #[arg(short, long, value_name = "INTENTS")]
        intents: PathBuf,
        #[arg(required = true, value_name = "MESSAGE")]
        message: Vec<String>,
    },
}

fn predict(model: PathBuf, path: bool, indices: bool, observations: Vec<String>) -> Result<()> {
    let model = HmmModel::from_path(model)?;
    let observations = if indices {
        observations
            .iter()
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| Error::InvalidObservation(format!("not an index: {s:?}")))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        model.encode(&observations)?
    };
    if path {
        println!("{}", model.predict_path(&observations)?.join(" "));
    } else {
        println!("{}", model.predict(&observations)?);
    }
    Ok(())
}

/// Posterior probability of a path with log score `score`. Zero for a
/// sequence no path can produce.
fn path_probability(score: f64, lognorm: f64) -> f64 {
    if lognorm == f64::NEG_INFINITY {
        0.0
    } else {
        (score - lognorm).exp()
    }
}

struct TagOpt {
    evaluate: bool,
    reference: bool,
    probability: bool,
    marginal: bool,
    quiet: bool,
}

fn tag(model: PathBuf, opt: TagOpt, datasets: Vec<PathBuf>) -> Result<()> {
    let model = HmmModel::from_path(model)?;
    let mut tagger = model.tagger();
    let mut evaluation = Evaluation::new(model.num_states());
    let mut labels = Vec::new();
    for (group, fpath) in datasets.iter().enumerate() {
        let mut ds = Dataset::default();
        ds.read_file(fpath, group)?;
        log::info!("tagging {} sequences from {}", ds.len(), fpath.display());
        for seq in &ds.seqs {
            let symbols: Vec<&str> = seq.items.iter().map(|&a| ds.symbol(a)).collect();
            let observations = match model.encode(&symbols) {
                Ok(observations) => observations,
                Err(e) => {
                    log::warn!("skipping sequence in {}: {e}", fpath.display());
                    continue;
                }
            };
            tagger.set_seq(&observations)?;
            labels.resize(seq.len(), 0);
            let score = tagger.viterbi(&mut labels);
            let prediction: Vec<&str> = labels.iter().map(|&l| model.label(l)).collect();
            let reference: Vec<&str> = seq.labels.iter().map(|&l| ds.label(l)).collect();
            if opt.evaluate {
                evaluation.accumulate(&reference, &prediction);
            }
            if opt.quiet {
                continue;
            }
            if opt.probability {
                println!("@probability\t{:.6}", path_probability(score, tagger.lognorm()));
            }
            for (t, label) in prediction.iter().enumerate() {
                let mut line = String::new();
                if opt.reference {
                    line.push_str(reference[t]);
                    line.push('\t');
                }
                line.push_str(label);
                if opt.marginal {
                    line.push_str(&format!(":{:.6}", tagger.marginal_point(labels[t], t)));
                }
                println!("{line}");
            }
            println!();
        }
    }
    if opt.evaluate {
        evaluation.evaluate();
        println!("{evaluation}");
    }
    Ok(())
}

fn train(
    model: PathBuf,
    holdout: Option<usize>,
    parameters: Vec<String>,
    datasets: Vec<PathBuf>,
) -> Result<()> {
    let mut opt = TrainerOpt::default();
    for s in &parameters {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| Error::InvalidArgument(format!("expected NAME=VALUE, got {s:?}")))?;
        opt.set(name.trim(), value.trim())?;
    }
    let mut ds = Dataset::default();
    for (group, fpath) in datasets.iter().enumerate() {
        let n = ds.read_file(fpath, group)?;
        log::info!("read {n} sequences from {} (group {group})", fpath.display());
    }
    let hmm = HmmTrainer::new(opt).train(&ds, holdout)?;
    hmm.dump(model)
}

fn classify(intents: PathBuf, message: Vec<String>) -> Result<()> {
    let classifier = NgramClassifier::from_path(intents)?;
    let message = message.join(" ");
    let intent = classifier
        .predict(&message)
        .ok_or_else(|| Error::InvalidArgument("no intent can score the message".into()))?;
    println!("{intent}");
    Ok(())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Predict { model, path, indices, observations } => {
            predict(model, path, indices, observations)
        }
        Command::Tag { model, evaluate, reference, probability, marginal, quiet, datasets } => {
            let opt = TagOpt { evaluate, reference, probability, marginal, quiet };
            tag(model, opt, datasets)
        }
        Command::Train { model, holdout, parameters, datasets } => {
            train(model, holdout, parameters, datasets)
        }
        Command::Dump { model } => {
            println!("{}", HmmModel::from_path(model)?.to_json()?);
            Ok(())
        }
        Command::Classify { intents, message } => classify(intents, message),
    }
}

fn main() -> ExitCode {
    let argv = Argv::parse();
    let level = match argv.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
    log::debug!("{:?}", argv);
    match run(argv.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_of_impossible_sequence() {
        let p = path_probability(f64::NEG_INFINITY, f64::NEG_INFINITY);
        assert_eq!(p, 0.0);
        assert_eq!(format!("{p:.6}"), "0.000000");
        assert!((path_probability(0.25f64.ln(), 0.5f64.ln()) - 0.5).abs() < 1e-12);
    }
}
