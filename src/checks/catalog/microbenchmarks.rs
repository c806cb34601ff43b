//! CPU, memory, MPI and I/O microbenchmarks

use crate::checks::spec::{CheckSpec, Parameter, PerfPattern, SanityRule};
use crate::error::Result;
use crate::extraction::Extraction;
use crate::reference::{Dimension, ReferenceEntry, ReferenceTable, SelectorValue};
use crate::sanity::SanityCheck;

const CPU: &str = "cyclone:cpu";

/// Single-node STREAM, referenced per programming environment
pub fn stream_test() -> Result<CheckSpec> {
    let mut references = ReferenceTable::builder()
        .dimension(Dimension::Environ)
        .fallback(Dimension::Environ, "PrgEnv-gnu-nocuda");

    let per_environ = [
        ("PrgEnv-gnu-nocuda", [90400.0, 77100.0, 77600.0, 79300.0]),
        ("PrgEnv-intel", [92900.0, 91600.0, 96700.0, 96700.0]),
    ];
    for (environ, values) in per_environ {
        let key = [SelectorValue::from(environ)];
        for (metric, expected) in ["copy", "scale", "add", "triad"].into_iter().zip(values) {
            references = references.entry(
                &key,
                CPU,
                metric,
                ReferenceEntry::new(expected, Some(-0.05), None, "MB/s"),
            );
        }
    }

    let mut check = CheckSpec::builder("StreamTest")
        .descr("STREAM Benchmark")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda", "PrgEnv-intel"])
        .sanity(SanityRule::new(SanityCheck::found(
            r"Solution Validates: avg error less than",
        )?))
        .references(references.build()?)
        .tags(&["production"])
        .maintainers(&["CS"]);

    for (metric, label) in [("copy", "Copy"), ("scale", "Scale"), ("add", "Add"), ("triad", "Triad")] {
        check = check.perf(PerfPattern::new(
            metric,
            "MB/s",
            Extraction::named(&format!(r"{label}:\s+(?P<rate>\S+)\s+\S+"), "rate")?,
        ));
    }

    check.build()
}

/// STREAM run across 240 ranks; the last reported node figure counts
pub fn distributed_stream_test() -> Result<CheckSpec> {
    let mut references = ReferenceTable::builder();
    let mut check = CheckSpec::builder("DistributedStreamTest")
        .descr("Distributed STREAM memory bandwidth")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .sanity(SanityRule::new(SanityCheck::found(r"Node Triad")?))
        .tags(&["benchmark", "diagnostic", "maintenance", "performance"])
        .maintainers(&["cstyl"]);

    for (metric, expected) in [
        ("Copy", 149000.0),
        ("Scale", 141700.0),
        ("Add", 154500.0),
        ("Triad", 156300.0),
    ] {
        references = references.entry(
            &[],
            CPU,
            metric,
            ReferenceEntry::new(expected, Some(-0.05), Some(0.05), "MB/s"),
        );
        check = check.perf(PerfPattern::new(
            metric,
            "MB/s",
            Extraction::named(&format!(r"Node {metric}:(\s+\S+:){{0}}\s+(?P<val>\S+):"), "val")?
                .last(),
        ));
    }

    check.references(references.build()?).build()
}

fn osu_latency_pattern() -> Result<Extraction> {
    Ok(Extraction::indexed(r"(?m)^8\s+(\S+)", 1)?)
}

/// OSU point-to-point bandwidth and latency
pub fn osu_pt2pt_check() -> Result<CheckSpec> {
    let references = ReferenceTable::builder()
        .dimension(Dimension::Benchmark)
        .dimension(Dimension::BuildType)
        .entry(
            &["mpi.pt2pt.osu_bw".into(), "cpu".into()],
            CPU,
            "bandwidth",
            ReferenceEntry::new(12329.94, Some(-0.10), None, "MB/s"),
        )
        .entry(
            &["mpi.pt2pt.osu_latency".into(), "cpu".into()],
            CPU,
            "latency",
            ReferenceEntry::new(0.98, None, Some(0.10), "us"),
        )
        .build()?;

    CheckSpec::builder("OsuPt2ptCheck")
        .descr("OSU point-to-point microbenchmarks")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .parameter(
            Parameter::new("benchmark", ["mpi.pt2pt.osu_bw", "mpi.pt2pt.osu_latency"])
                .selecting(Dimension::Benchmark),
        )
        .parameter(Parameter::new("build_type", ["cpu"]).selecting(Dimension::BuildType))
        .sanity(
            SanityRule::new(SanityCheck::found(r"(?m)^4194304\s")?)
                .when("benchmark", "mpi.pt2pt.osu_bw"),
        )
        .sanity(
            SanityRule::new(SanityCheck::found(r"(?m)^8\s")?)
                .when("benchmark", "mpi.pt2pt.osu_latency"),
        )
        .perf(
            PerfPattern::new(
                "bandwidth",
                "MB/s",
                Extraction::indexed(r"(?m)^4194304\s+(\S+)", 1)?,
            )
            .when("benchmark", "mpi.pt2pt.osu_bw"),
        )
        .perf(
            PerfPattern::new("latency", "us", osu_latency_pattern()?)
                .when("benchmark", "mpi.pt2pt.osu_latency"),
        )
        .references(references)
        .tags(&["benchmark", "diagnostic", "maintenance"])
        .maintainers(&["cstyl"])
        .build()
}

/// OSU collective latency on 3 and 6 nodes
pub fn osu_collective_check() -> Result<CheckSpec> {
    let mut references = ReferenceTable::builder()
        .dimension(Dimension::Benchmark)
        .dimension(Dimension::NumNodes);
    for (benchmark, nodes, expected) in [
        ("mpi.collective.osu_allreduce", 3u32, 2.79),
        ("mpi.collective.osu_allreduce", 6, 3.22),
        ("mpi.collective.osu_alltoall", 3, 1.77),
        ("mpi.collective.osu_alltoall", 6, 1.93),
    ] {
        references = references.entry(
            &[benchmark.into(), nodes.into()],
            CPU,
            "latency",
            ReferenceEntry::new(expected, None, Some(0.10), "us"),
        );
    }

    CheckSpec::builder("OsuCollectiveCheck")
        .descr("OSU collective microbenchmarks")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .parameter(
            Parameter::new(
                "benchmark",
                ["mpi.collective.osu_alltoall", "mpi.collective.osu_allreduce"],
            )
            .selecting(Dimension::Benchmark),
        )
        .parameter(Parameter::new("num_nodes", [3u32, 6]).selecting(Dimension::NumNodes))
        .sanity(SanityRule::new(SanityCheck::found(r"(?m)^8\s")?))
        .perf(PerfPattern::new("latency", "us", osu_latency_pattern()?))
        .references(references.build()?)
        .tags(&["benchmark", "diagnostic", "maintenance"])
        .maintainers(&["cstyl"])
        .build()
}

fn benchio_storage() -> Parameter {
    Parameter::new("benchmark", ["nvme", "scratch"]).selecting(Dimension::Benchmark)
}

/// benchio MPI-IO write rate on 1 and 2 nodes
pub fn benchio_small_test() -> Result<CheckSpec> {
    let mut references = ReferenceTable::builder()
        .dimension(Dimension::Benchmark)
        .dimension(Dimension::NumNodes);
    for (storage, nodes, expected) in [
        ("nvme", 1u32, 1.1),
        ("nvme", 2, 1.6),
        ("scratch", 1, 1.4),
        ("scratch", 2, 2.5),
    ] {
        references = references.entry(
            &[storage.into(), nodes.into()],
            CPU,
            "unstriped_mpiio",
            ReferenceEntry::new(expected, Some(-0.8), Some(0.8), "GB/s"),
        );
    }

    CheckSpec::builder("BenchioSmallTest")
        .descr("benchio small MPI-IO write")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .parameter(Parameter::new("num_nodes", [1u32, 2]).selecting(Dimension::NumNodes))
        .parameter(benchio_storage())
        .sanity(SanityRule::new(SanityCheck::found(r"Finished")?))
        .perf(PerfPattern::new(
            "unstriped_mpiio",
            "GB/s",
            Extraction::indexed(
                r"Writing to unstriped/mpiio\.dat\W*\n\W*time\W*=\W*\d+.\d*\W*,\W*rate\W*=\W*(\d+.\d*)",
                1,
            )?,
        ))
        .references(references.build()?)
        .tags(&["performance", "short", "io"])
        .build()
}

/// benchio file-per-process write rate on 8 nodes
pub fn benchio_medium_multifile_test() -> Result<CheckSpec> {
    let references = ReferenceTable::builder()
        .dimension(Dimension::Benchmark)
        .entry(
            &["nvme".into()],
            CPU,
            "unstriped_file",
            ReferenceEntry::new(9.5, Some(-0.8), Some(0.8), "GB/s"),
        )
        .entry(
            &["scratch".into()],
            CPU,
            "unstriped_file",
            ReferenceEntry::new(14.0, Some(-0.8), Some(0.8), "GB/s"),
        )
        .build()?;

    CheckSpec::builder("BenchioMediumMultiFileTest")
        .descr("benchio medium file-per-process write")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .parameter(Parameter::new("num_nodes", [8u32]))
        .parameter(benchio_storage())
        .sanity(SanityRule::new(SanityCheck::found(r"Finished")?))
        .perf(PerfPattern::new(
            "unstriped_file",
            "GB/s",
            Extraction::indexed(
                r"Writing to unstriped/proc000000\.dat\W*\n\W*time\W*=\W*\d+.\d*\W*,\W*rate\W*=\W*(\d+.\d*)",
                1,
            )?,
        ))
        .references(references)
        .tags(&["performance", "short", "io"])
        .build()
}

/// Time to allocate 4096 MB
pub fn alloc_speed_test() -> Result<CheckSpec> {
    let references = ReferenceTable::builder()
        .entry(
            &[],
            CPU,
            "time",
            ReferenceEntry::new(0.29, None, Some(0.15), "s"),
        )
        .build()?;

    CheckSpec::builder("AllocSpeedTest")
        .descr("Time to allocate 4096 MB")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .sanity(SanityRule::new(SanityCheck::found("4096 MB")?))
        .perf(PerfPattern::new(
            "time",
            "s",
            Extraction::named(r"4096 MB, allocation time (?P<time>\S+)", "time")?,
        ))
        .references(references)
        .tags(&["benchmark", "diagnostic", "maintenance"])
        .maintainers(&["cstyl"])
        .build()
}

/// Halo exchange timings for 2, 4 and 6 neighbours at three message sizes.
///
/// Reported but never fatal: the check is not strict.
pub fn halo_cell_exchange_test() -> Result<CheckSpec> {
    let layouts = [(2, "2 1 1"), (4, "2 2 1"), (6, "3 2 1")];
    let sizes = [10u32, 10_000, 1_000_000];
    let expected = [
        [1.640666e-06, 1.247299e-05, 3.311696e-04],
        [2.003486e-06, 1.315197e-05, 4.385816e-04],
        [2.015788e-06, 1.309701e-05, 4.473129e-04],
    ];

    let mut references = ReferenceTable::builder();
    let mut check = CheckSpec::builder("HaloCellExchangeTest")
        .descr("MPI halo cell exchange")
        .valid_systems(&[CPU])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .sanity(SanityRule::new(SanityCheck::count("halo_cell_exchange", 9)?))
        .strict_check(false)
        .tags(&["benchmark", "diagnostic", "maintenance"])
        .maintainers(&["cstyl"]);

    for ((neighbours, grid), row) in layouts.into_iter().zip(expected) {
        for (size, value) in sizes.into_iter().zip(row) {
            let metric = format!("time_{neighbours}_{size}");
            let pattern = format!(
                r"halo_cell_exchange 6 {grid} {size} {size} {size} \S+ (?P<time_mpi>\S+)"
            );
            references = references.entry(
                &[],
                CPU,
                &metric,
                ReferenceEntry::new(value, None, Some(0.50), "s"),
            );
            check = check.perf(PerfPattern::new(
                &metric,
                "s",
                Extraction::named(&pattern, "time_mpi")?,
            ));
        }
    }

    check.references(references.build()?).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_microbenchmarks_build_and_validate() {
        for check in [
            stream_test(),
            distributed_stream_test(),
            osu_pt2pt_check(),
            osu_collective_check(),
            benchio_small_test(),
            benchio_medium_multifile_test(),
            alloc_speed_test(),
            halo_cell_exchange_test(),
        ] {
            let check = check.unwrap();
            check.validate().unwrap();
            assert!(!check.perf_patterns.is_empty(), "{} has no perf patterns", check.name);
        }
    }

    #[test]
    fn test_halo_patterns() {
        let check = halo_cell_exchange_test().unwrap();
        assert_eq!(check.perf_patterns.len(), 9);
        assert!(!check.strict_check);

        let line = "halo_cell_exchange 6 3 2 1 10000 10000 10000 0.1 1.3e-05\n";
        let pattern = check
            .perf_patterns
            .iter()
            .find(|p| p.metric == "time_6_10000")
            .unwrap();
        assert_eq!(pattern.extraction.extract(line).unwrap(), 1.3e-05);
    }

    #[test]
    fn test_distributed_stream_takes_last_node() {
        let check = distributed_stream_test().unwrap();
        let triad = check.perf_patterns.iter().find(|p| p.metric == "Triad").unwrap();
        let output = "Node Triad: 150000.0: 1.0\nNode Triad: 157000.5: 1.0\n";
        assert_eq!(triad.extraction.extract(output).unwrap(), 157000.5);
    }

    #[test]
    fn test_benchio_rate_spans_lines() {
        let check = benchio_small_test().unwrap();
        let output = "Writing to unstriped/mpiio.dat\n time = 1.234 , rate = 1.456 GiB/s\n";
        assert_eq!(check.perf_patterns[0].extraction.extract(output).unwrap(), 1.456);
    }
}
