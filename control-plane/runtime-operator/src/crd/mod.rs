pub mod kogito_runtime;
