//! CLI options.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dataset::reader::Delimiter;
use crate::opts::parsers::non_negative_f64;
use crate::{AlsConfig, BaselineConfig, BiasConfig, PlsaConfig, RbmConfig, SgdFactorizationConfig};

pub mod parsers;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Opts {
    /// Sentry DSN
    #[arg(short, long, env = "SENTRY_DSN")]
    pub sentry_dsn: Option<String>,

    #[command(subcommand)]
    pub subcommand: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Predicts the mean training rating
    GlobalAverage(BaselineOpts),

    /// Predicts the user's mean rating
    UserAverage(BaselineOpts),

    /// Predicts the item's mean rating
    ItemAverage(BaselineOpts),

    /// Fits user and item biases around the mean rating
    BiasedBaseline(BiasedBaselineOpts),

    /// Probabilistic matrix factorization
    Pmf(FactorizationOpts),

    /// Biased matrix factorization squashed by the logistic function
    BiasedPmf(BiasedFactorizationOpts),

    /// Biased matrix factorization with implicit feedback
    SvdPlusPlus(BiasedFactorizationOpts),

    /// Biased logistic factorization regularized by a trust network
    Social(SocialOpts),

    /// Alternating least squares
    Als(AlsOpts),

    /// Probabilistic latent semantic analysis
    Plsa(PlsaOpts),

    /// Restricted Boltzmann machine
    Rbm(RbmOpts),
}

#[derive(Args)]
pub struct DataOpts {
    /// Training ratings file
    #[arg(long = "train")]
    pub train_path: PathBuf,

    /// Test ratings file, evaluated after training
    #[arg(long = "test")]
    pub test_path: Option<PathBuf>,

    /// Rating file field separator
    #[arg(long, value_enum, default_value_t = Delimiter::Tab)]
    pub delimiter: Delimiter,
}

#[derive(Args)]
pub struct BaselineOpts {
    #[command(flatten)]
    pub data: DataOpts,
}

#[derive(Args)]
pub struct BiasedBaselineOpts {
    #[command(flatten)]
    pub data: DataOpts,

    #[command(flatten)]
    pub baseline: BaselineConfig,
}

#[derive(Args)]
pub struct FactorizationOpts {
    #[command(flatten)]
    pub data: DataOpts,

    #[command(flatten)]
    pub factorization: SgdFactorizationConfig,
}

#[derive(Args)]
pub struct BiasedFactorizationOpts {
    #[command(flatten)]
    pub data: DataOpts,

    #[command(flatten)]
    pub factorization: SgdFactorizationConfig,

    #[command(flatten)]
    pub bias: BiasConfig,
}

#[derive(Args)]
pub struct SocialOpts {
    #[command(flatten)]
    pub factorization: BiasedFactorizationOpts,

    /// Trust network file: `truster trustee` per line
    #[arg(long = "trust")]
    pub trust_path: PathBuf,

    /// Weight of the social regularization term
    #[arg(long = "social-reg", default_value_t = 0.01, value_parser = non_negative_f64)]
    pub social_regularization: f64,
}

#[derive(Args)]
pub struct AlsOpts {
    #[command(flatten)]
    pub data: DataOpts,

    #[command(flatten)]
    pub als: AlsConfig,
}

#[derive(Args)]
pub struct PlsaOpts {
    #[command(flatten)]
    pub data: DataOpts,

    #[command(flatten)]
    pub plsa: PlsaConfig,
}

#[derive(Args)]
pub struct RbmOpts {
    #[command(flatten)]
    pub data: DataOpts,

    #[command(flatten)]
    pub rbm: RbmConfig,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_ok() {
        Opts::command().debug_assert();
    }

    #[test]
    fn social_ok() -> crate::Result {
        let opts = Opts::try_parse_from([
            "latent-ratings",
            "social",
            "--train",
            "ratings.txt",
            "--trust",
            "trust.txt",
            "--factors",
            "5",
            "--social-reg",
            "0.5",
            "--delimiter",
            "space",
            "--lr",
            "0.02",
            "--bias-lr",
            "3",
        ])?;
        let Command::Social(opts) = opts.subcommand else { panic!("expected `social`") };
        assert_eq!(opts.factorization.factorization.n_factors, 5);
        assert_eq!(opts.factorization.data.delimiter, Delimiter::Space);
        assert!((opts.social_regularization - 0.5).abs() < f64::EPSILON);
        assert!(opts.factorization.data.test_path.is_none());
        assert!((opts.factorization.factorization.learning_rate - 0.02).abs() < f64::EPSILON);
        assert!((opts.factorization.bias.learning_rate - 3.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn biased_pmf_ok() -> crate::Result {
        let opts = Opts::try_parse_from([
            "latent-ratings",
            "biased-pmf",
            "--train",
            "ratings.txt",
            "--lr",
            "0.5",
            "--bias-lr",
            "2",
            "--user-reg",
            "0.3",
            "--bias-user-reg",
            "0.7",
        ])?;
        let Command::BiasedPmf(opts) = opts.subcommand else { panic!("expected `biased-pmf`") };
        assert!((opts.factorization.learning_rate - 0.5).abs() < f64::EPSILON);
        assert!((opts.bias.learning_rate - 2.0).abs() < f64::EPSILON);
        assert!((opts.factorization.user_regularization - 0.3).abs() < f64::EPSILON);
        assert!((opts.bias.user_regularization - 0.7).abs() < f64::EPSILON);
        assert!((opts.factorization.item_regularization - 0.05).abs() < f64::EPSILON);
        assert!((opts.bias.item_regularization - 0.1).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn svd_plus_plus_ok() -> crate::Result {
        let opts = Opts::try_parse_from([
            "latent-ratings",
            "svd-plus-plus",
            "--train",
            "ratings.txt",
            "--test",
            "test.txt",
            "--factors",
            "20",
            "--item-reg",
            "0.2",
            "--bias-item-reg",
            "0.4",
            "--epochs",
            "7",
            "--seed",
            "42",
        ])?;
        let Command::SvdPlusPlus(opts) = opts.subcommand else { panic!("expected `svd-plus-plus`") };
        assert_eq!(opts.factorization.n_factors, 20);
        assert_eq!(opts.factorization.n_epochs, 7);
        assert_eq!(opts.factorization.seed, Some(42));
        assert!((opts.factorization.item_regularization - 0.2).abs() < f64::EPSILON);
        assert!((opts.bias.item_regularization - 0.4).abs() < f64::EPSILON);
        assert!((opts.factorization.learning_rate - 0.01).abs() < f64::EPSILON);
        assert!((opts.bias.learning_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(opts.data.test_path, Some(PathBuf::from("test.txt")));
        Ok(())
    }

    #[test]
    fn rbm_ok() -> crate::Result {
        let opts = Opts::try_parse_from([
            "latent-ratings",
            "rbm",
            "--train",
            "ratings.txt",
            "--hidden",
            "200",
            "--softmax",
            "10",
            "--min-rating",
            "0",
            "--epsilon-w",
            "0.002",
            "--epsilon-vb",
            "0.01",
            "--epsilon-hb",
            "0.001",
            "--weight-cost",
            "0",
            "--momentum",
            "0.5",
            "--final-momentum",
            "0.95",
            "--batch-size",
            "50",
            "--epochs",
            "3",
        ])?;
        let Command::Rbm(opts) = opts.subcommand else { panic!("expected `rbm`") };
        let config = opts.rbm;
        assert_eq!(config.n_hidden, 200);
        assert_eq!(config.softmax, 10);
        assert_eq!(config.min_rating, 0);
        assert!((config.weight_learning_rate - 0.002).abs() < f64::EPSILON);
        assert!((config.visible_learning_rate - 0.01).abs() < f64::EPSILON);
        assert!((config.hidden_learning_rate - 0.001).abs() < f64::EPSILON);
        assert!(config.weight_cost.abs() < f64::EPSILON);
        assert!((config.momentum - 0.5).abs() < f64::EPSILON);
        assert!((config.final_momentum - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.n_epochs, 3);
        assert_eq!(config.seed, None);
        Ok(())
    }

    #[test]
    fn zero_epochs_fails() {
        let result =
            Opts::try_parse_from(["latent-ratings", "als", "--train", "ratings.txt", "--epochs", "0"]);
        assert!(result.is_err());
    }
}
