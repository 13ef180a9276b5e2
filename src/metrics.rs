// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts};

pub static SPLITSTORE_MISS: Lazy<Box<IntCounter>> = Lazy::new(|| {
    let counter = Box::new(
        IntCounter::with_opts(Opts::new(
            "splitstore_miss_total",
            "Number of hotstore read misses served by the coldstore",
        ))
        .unwrap(),
    );
    prometheus::default_registry()
        .register(counter.clone())
        .expect(
            "Registering the splitstore_miss_total metric with the metrics registry must succeed",
        );
    counter
});

pub static COMPACTION_SECONDS: Lazy<Box<Histogram>> = Lazy::new(|| {
    let histogram = Box::new(
        Histogram::with_opts(
            HistogramOpts::new(
                "splitstore_compaction_seconds",
                "Histogram of compaction wall-clock time",
            )
            .buckets(vec![1., 10., 60., 300., 900., 1800., 3600.]),
        )
        .unwrap(),
    );
    prometheus::default_registry()
        .register(histogram.clone())
        .expect("Registering the splitstore_compaction_seconds metric with the metrics registry must succeed");
    histogram
});

pub static COMPACTION_HOT: Lazy<Box<IntGauge>> = Lazy::new(|| {
    let gauge = Box::new(
        IntGauge::with_opts(Opts::new(
            "splitstore_compaction_hot",
            "Number of blocks retained in the hotstore by the last compaction",
        ))
        .unwrap(),
    );
    prometheus::default_registry()
        .register(gauge.clone())
        .expect(
            "Registering the splitstore_compaction_hot metric with the metrics registry must succeed",
        );
    gauge
});

pub static COMPACTION_COLD: Lazy<Box<IntGauge>> = Lazy::new(|| {
    let gauge = Box::new(
        IntGauge::with_opts(Opts::new(
            "splitstore_compaction_cold",
            "Number of blocks moved to the coldstore by the last compaction",
        ))
        .unwrap(),
    );
    prometheus::default_registry()
        .register(gauge.clone())
        .expect(
            "Registering the splitstore_compaction_cold metric with the metrics registry must succeed",
        );
    gauge
});
