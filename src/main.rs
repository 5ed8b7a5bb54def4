use clap::Parser;
use latent_ratings::dataset::reader::{read_ratings, read_trust_graph};
use latent_ratings::helpers::tracing::format_elapsed;
use latent_ratings::opts::{Command, DataOpts, Opts, SocialOpts};
use latent_ratings::prelude::*;
use latent_ratings::{
    rmse, AlternatingLeastSquares, BiasedBaseline, GlobalAverage, InteractionStore, ItemAverage,
    LogisticFactorization, ProbabilisticLatentSemanticAnalysis, ProbabilisticMatrixFactorization,
    RatingPredictor, RestrictedBoltzmannMachine, SocialRegularization, SvdPlusPlus, UserAverage,
};

fn main() -> Result {
    let opts = Opts::parse();
    let _sentry_guard = latent_ratings::helpers::tracing::init(opts.sentry_dsn.clone())?;
    let start_instant = Instant::now();
    run_subcommand(opts.subcommand)?;
    info!(elapsed = %format_elapsed(start_instant), "finished");
    Ok(())
}

fn run_subcommand(command: Command) -> Result {
    match command {
        Command::GlobalAverage(opts) => {
            let (train, test) = read_data(&opts.data)?;
            train_and_evaluate(GlobalAverage::new(train)?, test)
        }
        Command::UserAverage(opts) => {
            let (train, test) = read_data(&opts.data)?;
            train_and_evaluate(UserAverage::new(train)?, test)
        }
        Command::ItemAverage(opts) => {
            let (train, test) = read_data(&opts.data)?;
            train_and_evaluate(ItemAverage::new(train)?, test)
        }
        Command::BiasedBaseline(opts) => {
            let (train, test) = read_data(&opts.data)?;
            train_and_evaluate(BiasedBaseline::new(train, opts.baseline)?, test)
        }
        Command::Pmf(opts) => {
            let (train, test) = read_data(&opts.data)?;
            let predictor = ProbabilisticMatrixFactorization::new(train, opts.factorization)?;
            train_and_evaluate(predictor, test)
        }
        Command::BiasedPmf(opts) => {
            let (train, test) = read_data(&opts.data)?;
            let predictor = LogisticFactorization::new(train, opts.factorization, opts.bias)?;
            train_and_evaluate(predictor, test)
        }
        Command::SvdPlusPlus(opts) => {
            let (train, test) = read_data(&opts.data)?;
            let predictor = SvdPlusPlus::new(train, opts.factorization, opts.bias)?;
            train_and_evaluate(predictor, test)
        }
        Command::Social(opts) => {
            let SocialOpts {
                factorization: opts,
                trust_path,
                social_regularization,
            } = opts;
            let graph = read_trust_graph(&trust_path)?;
            let (train, test) = read_data(&opts.data)?;
            let predictor = LogisticFactorization::new(train, opts.factorization, opts.bias)?
                .with_social(SocialRegularization::new(graph, social_regularization));
            train_and_evaluate(predictor, test)
        }
        Command::Als(opts) => {
            let (train, test) = read_data(&opts.data)?;
            train_and_evaluate(AlternatingLeastSquares::new(train, opts.als)?, test)
        }
        Command::Plsa(opts) => {
            let (train, test) = read_data(&opts.data)?;
            train_and_evaluate(ProbabilisticLatentSemanticAnalysis::new(train, opts.plsa)?, test)
        }
        Command::Rbm(opts) => {
            let (train, test) = read_data(&opts.data)?;
            let mut predictor = RestrictedBoltzmannMachine::new(train, opts.rbm)?;
            if let Some(test) = &test {
                predictor = predictor.with_test(test.clone());
            }
            train_and_evaluate(predictor, test)
        }
    }
}

fn read_data(opts: &DataOpts) -> Result<(InteractionStore, Option<InteractionStore>)> {
    let train = read_ratings(&opts.train_path, opts.delimiter).context("failed to read the training set")?;
    let test = opts
        .test_path
        .as_deref()
        .map(|path| read_ratings(path, opts.delimiter))
        .transpose()
        .context("failed to read the test set")?;
    Ok((train, test))
}

fn train_and_evaluate(mut predictor: impl RatingPredictor, test: Option<InteractionStore>) -> Result {
    predictor.train()?;
    match test {
        Some(test) => {
            rmse(&predictor, &test);
        }
        None => warn!("no test set given, skipping the evaluation"),
    }
    Ok(())
}
