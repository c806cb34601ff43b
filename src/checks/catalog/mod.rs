//! The Cyclone regression suite

pub mod apps;
pub mod microbenchmarks;
pub mod prgenv;

use super::spec::CheckSpec;
use crate::error::Result;

/// Every built-in check definition
pub fn all() -> Result<Vec<CheckSpec>> {
    let mut checks = vec![
        microbenchmarks::stream_test()?,
        microbenchmarks::distributed_stream_test()?,
        microbenchmarks::osu_pt2pt_check()?,
        microbenchmarks::osu_collective_check()?,
        microbenchmarks::benchio_small_test()?,
        microbenchmarks::benchio_medium_multifile_test()?,
        microbenchmarks::alloc_speed_test()?,
        microbenchmarks::halo_cell_exchange_test()?,
        apps::gromacs_cpu_check()?,
        apps::pytorch_distr_cnn_check()?,
        prgenv::mpi_init_test()?,
        prgenv::mpi_hello_test()?,
        prgenv::hello_multi_lang_test()?,
    ];
    checks.extend(prgenv::hello_world_checks()?);
    Ok(checks)
}
