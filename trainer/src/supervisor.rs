use std::thread;

use landscape::SurrogateProblem;
use log::info;
use opt_net::ActorCritic;
use param_store::{ParameterStore, RmsProp};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    CancellationToken, Result, TrainerConfig, TrainerErr,
    worker::{TrainingWorker, WorkerReport},
};

/// Outcome of a whole training run.
#[derive(Debug)]
pub struct TrainReport {
    /// Final value of the global step counter.
    pub global_steps: u64,
    /// Final shared parameters, flat, in layout order.
    pub parameters: Vec<f32>,
    pub workers: Vec<WorkerReport>,
}

/// Runs a training session to completion with an internal stop token, i.e.
/// until the step budget is exhausted.
pub fn train(config: &TrainerConfig) -> Result<TrainReport> {
    train_with_token(config, &CancellationToken::new())
}

/// Runs a training session: builds the model and the shared store, spawns the
/// configured number of workers, joins them all, and writes the checkpoint if
/// one was requested.
///
/// Fatal configuration errors abort here, before any worker is spawned.
///
/// # Arguments
/// * `config` - The run's immutable configuration.
/// * `token` - External stop signal; every worker observes a cancellation
///   within at most one rollout.
pub fn train_with_token(config: &TrainerConfig, token: &CancellationToken) -> Result<TrainReport> {
    config.validate()?;

    let model = ActorCritic::new(&config.model)?;
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);
    let init = model.init_params(&mut rng);

    let rmsprop = config.rmsprop;
    let learning_rate = config.learning_rate;
    let store = ParameterStore::new(model.layout(), &init, config.grad_norm_clip, |len| {
        RmsProp::new(len, learning_rate, rmsprop.alpha, rmsprop.momentum, rmsprop.epsilon)
    })?;

    let mut workers = Vec::with_capacity(config.workers.get());
    for id in 0..config.workers.get() {
        let model = ActorCritic::new(&config.model)?;
        let problem = SurrogateProblem::new(config.landscape.clone());
        workers.push(TrainingWorker::new(
            id,
            model,
            problem,
            store.clone(),
            config,
            seed.wrapping_add(1 + id as u64),
        ));
    }

    info!(
        workers = config.workers.get() as u64, max_time_steps = config.max_time_steps;
        "starting training"
    );

    let results: Vec<thread::Result<Result<WorkerReport>>> = thread::scope(|s| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| {
                s.spawn(move || {
                    let result = worker.run(token);
                    if result.is_err() {
                        // Take the rest of the fleet down with us.
                        token.cancel();
                    }
                    result
                })
            })
            .collect();

        handles.into_iter().map(|handle| handle.join()).collect()
    });

    let mut reports = Vec::new();
    for (worker_id, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(TrainerErr::WorkerPanic { worker_id }),
        }
    }

    if let Some(path) = &config.save_path {
        param_store::save(&store, path)?;
        info!("checkpoint written to {}", path.display());
    }

    let mut parameters = vec![0.0; store.len()];
    store.read_into(&mut parameters)?;

    Ok(TrainReport {
        global_steps: store.steps(),
        parameters,
        workers: reports,
    })
}
