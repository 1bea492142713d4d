pub mod step_results;
