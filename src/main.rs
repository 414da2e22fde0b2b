use std::error::Error;

use clap::{clap_app, ArgMatches};
use log::{error, info, LevelFilter};
use mdp_prctl::model_checking::conditional::compute_conditional_probabilities;
use mdp_prctl::model_checking::hint::ModelCheckerHint;
use mdp_prctl::model_checking::lra::{compute_long_run_average_probabilities, compute_long_run_average_rewards};
use mdp_prctl::model_checking::reachability::{compute_reachability_rewards, compute_until_probabilities};
use mdp_prctl::storage::{BitVector, Scheduler};
use mdp_prctl::{read_environment_json, read_mdp_json, Environment, OptimizationDirection, SolveGoal, SparseModel};
use regex::Regex;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

fn main() {
    let matches = clap_app!(mdp_prctl =>
        (version: "0.1")
        (author: "Thomas Robinson")
        (about: "Probabilistic model checking of MDPs: reachability, rewards, long-run averages and conditional probabilities")
        (@arg MODEL: -m --model <PATH> "MDP model, a json file of transitions e.g.
            {
              \"states\": [0,1,2],
              \"initial\": 0,
              \"transitions\":
               [{
                  \"s\": 0,
                  \"a\": \"a\",
                  \"s_prime\": [{\"s\": 1,\"p\": 0.1},{\"s\": 2,\"p\": 0.9}],
                  \"rewards\": 1
               },...]
              \"labelling\": [
                {\"s\":  1, \"w\": \"goal\"},
                ...
              ]
            }
           ")
        (@arg ENV: -e --env [PATH] "Solver settings as json, e.g. {\"min_max_method\": \"PolicyIteration\", \"precision\": 1e-8}")
        (@arg QUERY: -q --query [QUERY] default_value("until") "Query to check: \
           until - probability of phi U target
           reward - expected reward until target
           lra - long-run fraction of time in target (long-run average reward with --rewards)
           conditional - probability of reaching target given condition, for the initial state
           ")
        (@arg DIR: -d --direction [DIR] default_value("max") "Optimization direction, min or max")
        (@arg TARGET: -t --target [REGEX] "Target states, by a regular expression over state labels")
        (@arg PHI: -p --phi [REGEX] "Constraint states of until, all states by default")
        (@arg CONDITION: -c --condition [REGEX] "Condition states of a conditional query")
        (@arg REWARDS: -r --rewards "Use the transition rewards of the model for lra")
        (@arg SCHEDULER: -s --scheduler "Print an optimal scheduler for until and reward queries")
        (@arg VERBOSE: -v --verbose [VERBOSITY] default_value("0") "Level of verbosity \
           0 - warnings
           1 - preprocessing information
           2 - algorithm debugging
           3 - everything
           ")
    )
    .get_matches();

    let level = match matches.value_of("VERBOSE").and_then(|v| v.parse::<u32>().ok()).unwrap_or(0) {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("Error: could not set up logging: {}", e);
    }

    if let Err(e) = run(&matches) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn select_states(model: &SparseModel, pattern: Option<&str>) -> Result<Option<BitVector>, Box<dyn Error>> {
    match pattern {
        Some(p) => {
            let re = Regex::new(p)?;
            let states = model.states_matching(&re);
            info!("{} state(s) match {}", states.number_of_set_bits(), p);
            Ok(Some(states))
        }
        None => Ok(None),
    }
}

fn print_values(model: &SparseModel, values: &[f64]) {
    for (name, value) in model.state_names.iter().zip(values.iter()) {
        println!("{}: {}", name, value);
    }
}

fn print_scheduler(model: &SparseModel, scheduler: &Scheduler) {
    println!("scheduler:");
    for (state, name) in model.state_names.iter().enumerate() {
        match scheduler.deterministic_choice(state) {
            Some(choice) => {
                let row = model.matrix.row_group(state).start + choice;
                println!("{}: {}", name, model.actions[row]);
            }
            None => println!("{}: undefined", name),
        }
    }
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let mdp_path = matches.value_of("MODEL").ok_or("no model given")?;
    info!("path: {}", mdp_path);
    let model = read_mdp_json(mdp_path)?.to_sparse_model()?;
    let env = match matches.value_of("ENV") {
        Some(path) => read_environment_json(path)?,
        None => Environment::default(),
    };
    let dir = match matches.value_of("DIR") {
        Some("min") => OptimizationDirection::Minimize,
        Some("max") => OptimizationDirection::Maximize,
        other => return Err(format!("unknown direction {:?}, expected min or max", other).into()),
    };
    let goal = SolveGoal::new(dir);
    let n = model.number_of_states();
    let target = select_states(&model, matches.value_of("TARGET"))?;
    let target = || target.as_ref().ok_or("no target given");
    let produce_scheduler = matches.is_present("SCHEDULER");
    let no_hint = ModelCheckerHint::empty();

    match matches.value_of("QUERY").unwrap_or("until") {
        "until" => {
            let phi = select_states(&model, matches.value_of("PHI"))?.unwrap_or_else(|| BitVector::new(n, true));
            let result = compute_until_probabilities(
                &env,
                goal,
                &model.matrix,
                &model.backward,
                &phi,
                target()?,
                false,
                produce_scheduler,
                &no_hint,
            )?;
            print_values(&model, &result.values);
            if let Some(scheduler) = result.scheduler.as_ref() {
                print_scheduler(&model, scheduler);
            }
        }
        "reward" => {
            let result = compute_reachability_rewards(
                &env,
                goal,
                &model.matrix,
                &model.backward,
                &model.rewards,
                target()?,
                false,
                produce_scheduler,
                &no_hint,
            )?;
            print_values(&model, &result.values);
            if let Some(scheduler) = result.scheduler.as_ref() {
                print_scheduler(&model, scheduler);
            }
        }
        "lra" => {
            let values = if matches.is_present("REWARDS") {
                compute_long_run_average_rewards(&env, &goal, &model.matrix, &model.rewards)?
            } else {
                compute_long_run_average_probabilities(&env, &goal, &model.matrix, target()?)?
            };
            print_values(&model, &values);
        }
        "conditional" => {
            let condition = select_states(&model, matches.value_of("CONDITION"))?.ok_or("no condition given")?;
            let goal = goal.with_relevant_values(model.initial_states());
            let result =
                compute_conditional_probabilities(&env, &goal, &model.matrix, &model.backward, target()?, &condition)?;
            println!("{}: {}", model.state_names[result.initial_state], result.value);
        }
        other => return Err(format!("unknown query {}", other).into()),
    }
    Ok(())
}
