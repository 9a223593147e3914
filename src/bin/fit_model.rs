use clap::{App, Arg};
use csem::baum_welch::add_data_pseudocounts;
use csem::forward_backward::log_likelihood;
use csem::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
#[macro_use]
extern crate log;

fn parse<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> csem::Result<T> {
    matches
        .value_of(name)
        .and_then(|x| x.parse().ok())
        .ok_or_else(|| Error::Config(format!("invalid value for --{}", name)))
}

// A model with random profiles and a sparse random transition graph.
fn random_model<R: Rng>(
    rng: &mut R,
    alphabet: &Alphabet,
    states: usize,
    window: usize,
) -> csem::Result<Hmm> {
    let profiles = (0..states)
        .map(|_| {
            let columns: Vec<Vec<f64>> = (0..window)
                .map(|_| {
                    (0..alphabet.size())
                        .map(|_| rng.gen_range(0f64..1f64).powi(4) + 0.01)
                        .collect()
                })
                .collect();
            let mut profile = ContextProfile::from_columns(&columns)?;
            profile.normalize();
            Ok(profile)
        })
        .collect::<csem::Result<Vec<_>>>()?;
    let priors = vec![1f64 / states as f64; states];
    let mut hmm = Hmm::new(alphabet.clone(), profiles, priors)?;
    for from in 0..states {
        hmm.set_transition(from, from, rng.gen_range(0.5..1f64));
        for _ in 0..2 {
            let to = rng.gen_range(0..states);
            hmm.set_transition(from, to, rng.gen_range(0.1..0.5f64));
        }
    }
    hmm.normalize_transitions()?;
    Ok(hmm)
}

fn main() -> csem::Result<()> {
    let matches = App::new("fit_model")
        .version("0.1")
        .author("Bansho Masutani")
        .about("Fit a context HMM to sequences simulated from a random context HMM.")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("states")
                .long("states")
                .short("k")
                .takes_value(true)
                .default_value("10")
                .help("Number of states."),
        )
        .arg(
            Arg::with_name("window")
                .long("window")
                .short("w")
                .takes_value(true)
                .default_value("5")
                .help("Length of context windows. Should be odd."),
        )
        .arg(
            Arg::with_name("length")
                .long("length")
                .takes_value(true)
                .default_value("300")
                .help("Length of each simulated sequence."),
        )
        .arg(
            Arg::with_name("num_seqs")
                .long("num_seqs")
                .takes_value(true)
                .default_value("100")
                .help("Number of simulated sequences."),
        )
        .arg(
            Arg::with_name("blocks")
                .long("blocks")
                .short("B")
                .takes_value(true)
                .default_value("0")
                .help("Number of blocks per scan. 0 means N^(3/8)."),
        )
        .arg(
            Arg::with_name("min_scans")
                .long("min_scans")
                .takes_value(true)
                .default_value("5")
                .help("Minimum number of scans."),
        )
        .arg(
            Arg::with_name("max_scans")
                .long("max_scans")
                .takes_value(true)
                .default_value("50")
                .help("Maximum number of scans."),
        )
        .arg(
            Arg::with_name("connectivity")
                .long("connectivity")
                .short("C")
                .takes_value(true)
                .default_value("0")
                .help("Maximum number of transitions per state. 0 means unconstrained."),
        )
        .arg(
            Arg::with_name("data_pc")
                .long("data_pc")
                .takes_value(true)
                .default_value("0.01")
                .help("Admixture of pseudocounts into the training data."),
        )
        .arg(
            Arg::with_name("jumpstart")
                .long("jumpstart")
                .short("j")
                .takes_value(true)
                .value_name("JSON")
                .help("Start from the model in [JSON] instead of sampled windows."),
        )
        .arg(
            Arg::with_name("batch")
                .long("batch")
                .help("Batch mode. Parameters are updated once per scan."),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short("o")
                .takes_value(true)
                .value_name("JSON")
                .help("Write the trained model to [JSON]."),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .default_value("32389")
                .help("Seed"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .default_value("1")
                .help("Number of threads"),
        )
        .get_matches();
    let level = match matches.occurrences_of("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let threads: usize = parse(&matches, "threads")?;
    if let Err(why) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        debug!("{:?}", why);
    }
    let states: usize = parse(&matches, "states")?;
    let window: usize = parse(&matches, "window")?;
    let length: usize = parse(&matches, "length")?;
    let num_seqs: usize = parse(&matches, "num_seqs")?;
    let seed: u64 = parse(&matches, "seed")?;
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
    let alphabet = Alphabet::dna();
    let truth = random_model(&mut rng, &alphabet, states, window)?;
    let mut subjects = (0..num_seqs)
        .map(|_| gen_seq::sample_sequence(&mut rng, &truth, length).map(Subject::from))
        .collect::<csem::Result<Vec<_>>>()?;
    debug!("Simulated {} sequences", subjects.len());
    let mut options = BaumWelchOptions::default();
    options.max_connectivity = parse(&matches, "connectivity")?;
    options.em.num_blocks = parse(&matches, "blocks")?;
    options.em.min_scans = parse(&matches, "min_scans")?;
    options.em.max_scans = parse(&matches, "max_scans")?;
    options.em.seed = seed;
    if matches.is_present("batch") {
        options.em.mode = TrainingMode::Batch;
    }
    options.data_pseudocounts = parse(&matches, "data_pc")?;
    let admixture = BackgroundAdmixture::uniform(alphabet.size());
    let mut hmm = match matches.value_of("jumpstart") {
        Some(path) => {
            let rdr = std::io::BufReader::new(std::fs::File::open(path)?);
            let hmm = read_hmm(rdr)?;
            info!("Jumpstart from {}", path);
            hmm
        }
        None => {
            let init_rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(rng.gen());
            let mut state_init =
                SamplingStateInitializer::new(&subjects, 0.2, 1f64, &admixture, init_rng);
            Hmm::with_initializers(
                alphabet.clone(),
                states,
                window,
                &mut state_init,
                &HomogeneousTransitionInitializer,
            )?
        }
    };
    options.validate()?;
    add_data_pseudocounts(
        &mut subjects,
        alphabet.size(),
        &admixture,
        options.data_pseudocounts,
    );
    let mut training = BaumWelchTraining::new(options, &mut hmm, &subjects, &admixture)?;
    let mut reporter = TableReporter::new(std::io::stdout());
    let state = training.train(&mut reporter)?;
    let emission = training.emission().clone();
    let num_eff_cols = training.num_eff_cols();
    println!("Status:{:?}\tScans:{}", state.status, state.scan);
    for (name, model) in vec![("Truth", &truth), ("Trained", &hmm)] {
        let lk = subjects
            .iter()
            .map(|s| log_likelihood(model, s, &emission))
            .sum::<csem::Result<f64>>()?;
        println!("{}\t{:.5}", name, lk / num_eff_cols);
    }
    println!("{}", hmm);
    if let Some(path) = matches.value_of("output") {
        let wtr = std::io::BufWriter::new(std::fs::File::create(path)?);
        write_hmm(&hmm, wtr)?;
    }
    Ok(())
}
