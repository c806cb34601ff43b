//! Application checks

use crate::checks::spec::{CheckSpec, OutputSource, PerfPattern, SanityRule};
use crate::error::Result;
use crate::extraction::{Aggregate, Extraction};
use crate::reference::{ReferenceEntry, ReferenceTable};
use crate::sanity::SanityCheck;

const GROMACS_LOG: &str = "md.log";
const GROMACS_ENERGY: f64 = -12071400.0;

const PYTORCH_THROUGHPUT_PER_GPU: f64 = 309.61;
const PYTORCH_NUM_TASKS: f64 = 16.0;

/// GROMACS 1.4M-atom benchmark on two CPU nodes
pub fn gromacs_cpu_check() -> Result<CheckSpec> {
    let log = OutputSource::File(GROMACS_LOG.to_string());

    let energy = Extraction::named(
        concat!(
            r"\s+Potential\s+Kinetic En\.\s+Total Energy",
            r"\s+Conserved En\.\s+Temperature\n",
            r"(\s+\S+){2}\s+(?P<energy>\S+)(\s+\S+){2}\n",
            r"\s+Pressure \(bar\)\s+Constr\. rmsd",
        ),
        "energy",
    )?
    .last();

    let references = ReferenceTable::builder()
        .entry(
            &[],
            "cyclone:cpu",
            "perf",
            ReferenceEntry::new(5.49, Some(-0.01), None, "ns/day"),
        )
        .build()?;

    CheckSpec::builder("GromacsCpuCheck")
        .descr("GROMACS check")
        .valid_systems(&["cyclone:cpu"])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
        .sanity(SanityRule::new(SanityCheck::found("Finished mdrun")?).reading(log.clone()))
        .sanity(
            SanityRule::new(SanityCheck::reference(
                energy,
                GROMACS_ENERGY,
                Some(-0.01),
                Some(0.01),
            ))
            .reading(log.clone()),
        )
        .perf(
            PerfPattern::new(
                "perf",
                "ns/day",
                Extraction::named(r"Performance:\s+(?P<perf>\S+)", "perf")?,
            )
            .reading(log),
        )
        .references(references)
        .tags(&["applications", "performance"])
        .maintainers(&["CS"])
        .build()
}

/// Distributed CNN training throughput on 16 V100s
pub fn pytorch_distr_cnn_check() -> Result<CheckSpec> {
    let references = ReferenceTable::builder()
        .entry(
            &[],
            "cyclone:gpu",
            "samples_per_sec_per_gpu",
            ReferenceEntry::new(PYTORCH_THROUGHPUT_PER_GPU, Some(-0.1), None, "samples/sec"),
        )
        .entry(
            &[],
            "cyclone:gpu",
            "samples_per_sec_total",
            ReferenceEntry::new(
                PYTORCH_THROUGHPUT_PER_GPU * PYTORCH_NUM_TASKS,
                Some(-0.1),
                None,
                "samples/sec",
            ),
        )
        .build()?;

    CheckSpec::builder("PytorchDistrCnnCheck")
        .descr("Check the training throughput of a cnn with torch.distributed")
        .valid_systems(&["cyclone:gpu"])
        .valid_prog_environs(&["PrgEnv-gnu"])
        .sanity(SanityRule::new(SanityCheck::found(r"Total average")?))
        .perf(PerfPattern::new(
            "samples_per_sec_per_gpu",
            "samples/sec",
            Extraction::named(r"Epoch\s+\d+:\s+(?P<rate>\S+)\s+images", "rate")?
                .aggregate(Aggregate::Mean),
        ))
        .perf(PerfPattern::new(
            "samples_per_sec_total",
            "samples/sec",
            Extraction::named(r"Total average: (?P<rate>\S+)\s+images", "rate")?
                .aggregate(Aggregate::Mean),
        ))
        .references(references)
        .tags(&["production"])
        .build()
}
