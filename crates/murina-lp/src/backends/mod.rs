pub mod minilp_backend;
