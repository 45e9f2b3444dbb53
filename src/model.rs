use polars::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::data::{column_f64, Observations};
use crate::error::ModelError;

/// Column holding the ground truth after scoring.
pub const TARGET_COLUMN: &str = "target";
/// Column holding the model output after scoring.
pub const PREDICTION_COLUMN: &str = "prediction";

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            seed: 0,
        }
    }
}

/// Split rows into `(train, test)` after a seeded shuffle.
///
/// The test set takes the first `ceil(n * test_size)` shuffled positions.
pub fn train_test_split(
    observations: &Observations,
    test_size: f64,
    seed: u64,
) -> Result<(Observations, Observations), ModelError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ModelError::InvalidTestSize(test_size));
    }

    // shuffle row positions with a fixed seed so the split is reproducible
    let mut positions: Vec<u32> = (0..observations.len() as u32).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    positions.shuffle(&mut rng);

    let n_test = (observations.len() as f64 * test_size).ceil() as usize;
    let (test_positions, train_positions) = positions.split_at(n_test.min(positions.len()));

    let train = observations.take(train_positions)?;
    let test = observations.take(test_positions)?;

    tracing::info!(train = train.len(), test = test.len(), "split observations");
    Ok((train, test))
}

/// Row-major feature matrix over `features`, in that column order.
pub fn feature_matrix(frame: &DataFrame, features: &[String]) -> Result<DenseMatrix<f64>, ModelError> {
    let array = frame
        .select(features)?
        .to_ndarray::<Float64Type>(IndexOrder::C)?;
    let rows: Vec<Vec<f64>> = array.outer_iter().map(|row| row.to_vec()).collect();
    Ok(DenseMatrix::from_2d_vec(&rows))
}

/// Random forest regressor bound to the feature columns it was fitted on.
pub struct BikeModel {
    forest: Forest,
    features: Vec<String>,
}

impl BikeModel {
    pub fn fit(
        frame: &DataFrame,
        features: &[String],
        target: &str,
        params: ForestParams,
    ) -> Result<Self, ModelError> {
        if frame.height() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let x = feature_matrix(frame, features)?;
        let y = column_f64(frame, target)?;

        // every split considers all features
        let parameters = RandomForestRegressorParameters {
            n_trees: params.n_estimators as _,
            m: Some(features.len()),
            seed: params.seed as _,
            ..Default::default()
        };
        let forest: Forest = RandomForestRegressor::fit(&x, &y, parameters)?;

        tracing::info!(
            rows = frame.height(),
            features = features.len(),
            n_estimators = params.n_estimators,
            "fitted random forest"
        );
        Ok(Self {
            forest,
            features: features.to_vec(),
        })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn predict(&self, frame: &DataFrame) -> Result<Vec<f64>, ModelError> {
        if frame.height() == 0 {
            return Ok(Vec::new());
        }
        let x = feature_matrix(frame, &self.features)?;
        Ok(self.forest.predict(&x)?)
    }

    /// Append a `target` copy of `target` and a `prediction` column.
    pub fn score(&self, observations: Observations, target: &str) -> Result<Observations, ModelError> {
        let predictions = self.predict(observations.frame())?;
        let truth = column_f64(observations.frame(), target)?;
        let scored = observations
            .with_column(Series::new(TARGET_COLUMN, truth))?
            .with_column(Series::new(PREDICTION_COLUMN, predictions))?;
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> Observations {
        let dates: Vec<String> = (0..n)
            .map(|i| format!("2011-01-{:02}", 1 + i / 24))
            .collect();
        let hours: Vec<i64> = (0..n).map(|i| (i % 24) as i64).collect();
        let temp: Vec<f64> = (0..n).map(|i| ((i * 7) % 23) as f64 / 23.0).collect();
        let hum: Vec<f64> = (0..n).map(|i| ((i * 5) % 17) as f64 / 17.0).collect();
        let cnt: Vec<f64> = (0..n)
            .map(|i| 10.0 + 100.0 * temp[i] + 4.0 * hours[i] as f64 - 20.0 * hum[i])
            .collect();
        let frame = df!(
            "dteday" => dates,
            "hr" => hours,
            "temp" => temp,
            "hum" => hum,
            "cnt" => cnt,
        )
        .unwrap();
        Observations::from_frame(frame).unwrap()
    }

    fn features() -> Vec<String> {
        vec!["temp".to_string(), "hum".to_string(), "hr".to_string()]
    }

    #[test]
    fn split_sizes_follow_test_size() {
        let obs = synthetic(100);
        let (train, test) = train_test_split(&obs, 0.3, 42).unwrap();
        assert_eq!(test.len(), 30);
        assert_eq!(train.len(), 70);

        let (train, test) = train_test_split(&synthetic(11), 0.3, 42).unwrap();
        assert_eq!(test.len(), 4);
        assert_eq!(train.len(), 7);
    }

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let obs = synthetic(120);
        let (train_a, test_a) = train_test_split(&obs, 0.3, 42).unwrap();
        let (train_b, test_b) = train_test_split(&obs, 0.3, 42).unwrap();
        assert_eq!(train_a.index(), train_b.index());
        assert_eq!(test_a.index(), test_b.index());
        assert!(test_a.index().iter().all(|ts| !train_a.index().contains(ts)));
    }

    #[test]
    fn split_rejects_degenerate_sizes() {
        let obs = synthetic(10);
        assert!(matches!(
            train_test_split(&obs, 0.0, 1),
            Err(ModelError::InvalidTestSize(_))
        ));
        assert!(matches!(
            train_test_split(&obs, 1.5, 1),
            Err(ModelError::InvalidTestSize(_))
        ));
    }

    #[test]
    fn fixed_seed_gives_identical_predictions() {
        let obs = synthetic(240);
        let params = ForestParams {
            n_estimators: 10,
            seed: 0,
        };
        let a = BikeModel::fit(obs.frame(), &features(), "cnt", params).unwrap();
        let b = BikeModel::fit(obs.frame(), &features(), "cnt", params).unwrap();
        assert_eq!(
            a.predict(obs.frame()).unwrap(),
            b.predict(obs.frame()).unwrap()
        );
    }

    #[test]
    fn forest_splits_on_every_feature() {
        let obs = synthetic(240);
        let features = features();
        let model = BikeModel::fit(obs.frame(), &features, "cnt", ForestParams::default()).unwrap();

        let x = feature_matrix(obs.frame(), &features).unwrap();
        let y = column_f64(obs.frame(), "cnt").unwrap();
        let explicit: Forest = RandomForestRegressor::fit(
            &x,
            &y,
            RandomForestRegressorParameters {
                n_trees: 50,
                m: Some(features.len()),
                seed: 0,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(model.predict(obs.frame()).unwrap(), explicit.predict(&x).unwrap());
    }

    #[test]
    fn forest_tracks_the_target() {
        let obs = synthetic(240);
        let model = BikeModel::fit(obs.frame(), &features(), "cnt", ForestParams::default()).unwrap();
        let predictions = model.predict(obs.frame()).unwrap();
        let truth = column_f64(obs.frame(), "cnt").unwrap();
        let mae = truth
            .iter()
            .zip(&predictions)
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / truth.len() as f64;
        let spread = truth.iter().cloned().fold(f64::MIN, f64::max)
            - truth.iter().cloned().fold(f64::MAX, f64::min);
        assert!(mae < spread * 0.2, "mae {mae} too large for spread {spread}");
    }

    #[test]
    fn score_adds_target_and_prediction() {
        let obs = synthetic(96);
        let model = BikeModel::fit(obs.frame(), &features(), "cnt", ForestParams::default()).unwrap();
        let scored = model.score(obs, "cnt").unwrap();
        assert_eq!(
            column_f64(scored.frame(), TARGET_COLUMN).unwrap(),
            column_f64(scored.frame(), "cnt").unwrap()
        );
        assert_eq!(column_f64(scored.frame(), PREDICTION_COLUMN).unwrap().len(), 96);
    }

    #[test]
    fn empty_inputs() {
        let obs = synthetic(48);
        let model = BikeModel::fit(obs.frame(), &features(), "cnt", ForestParams::default()).unwrap();
        let empty = obs.take(&[]).unwrap();
        assert!(model.predict(empty.frame()).unwrap().is_empty());
        assert!(matches!(
            BikeModel::fit(empty.frame(), &features(), "cnt", ForestParams::default()),
            Err(ModelError::EmptyTrainingSet)
        ));
    }
}
