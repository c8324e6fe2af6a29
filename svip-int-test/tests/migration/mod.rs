mod cli_test;
mod migration_test;
mod recovery_test;
