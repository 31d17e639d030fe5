//! Performance benchmarks for realmscout components.
//!
//! Covers the pure helpers that run on every candidate (SRV ordering,
//! hostname checks, base DN derivation) and one full ladder run against
//! in-memory doubles.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use realmscout::config::DiscoveryConfig;
use realmscout::discovery::{DiscoveryEngine, SearchRequest};
use realmscout::dns::{SrvTarget, candidate_hosts, order_srv_targets};
use realmscout::netutil;
use realmscout::probe::{ProbeStatus, RootEntry};
use realmscout::testing::{ScriptedProbe, StaticResolver};

fn srv_targets(count: usize) -> Vec<SrvTarget> {
    (0..count)
        .map(|i| {
            SrvTarget::new(
                &format!("server{i}.example.com."),
                389,
                (i % 4) as u16,
                ((i * 37) % 100) as u16,
            )
        })
        .collect()
}

fn bench_srv_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("srv_ordering");

    for count in [4, 32, 256] {
        let targets = srv_targets(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("order", count), &targets, |b, targets| {
            b.iter(|| {
                let mut targets = targets.clone();
                order_srv_targets(black_box(&mut targets));
                targets
            })
        });

        group.bench_with_input(
            BenchmarkId::new("candidate_hosts", count),
            &targets,
            |b, targets| b.iter(|| candidate_hosts(black_box(targets.clone()))),
        );
    }

    group.finish();
}

fn bench_hostname_checks(c: &mut Criterion) {
    let hosts = [
        "server1.example.com",
        "a-very-long-label-name-that-is-still-valid.sub.domain.example.org",
        "bad_label-.example.com",
        "10.0.0.5",
        "[2001:db8::1]",
    ];

    c.bench_function("is_valid_hostname", |b| {
        b.iter(|| {
            for host in &hosts {
                black_box(netutil::is_valid_hostname(black_box(host)));
            }
        })
    });

    c.bench_function("is_ip_literal", |b| {
        b.iter(|| {
            for host in &hosts {
                black_box(netutil::is_ip_literal(black_box(host)));
            }
        })
    });

    c.bench_function("domain_walk", |b| {
        b.iter(|| netutil::domain_walk(black_box("client1.lab.east.corp.example.com")))
    });
}

fn bench_basedn(c: &mut Criterion) {
    let mut group = c.benchmark_group("basedn_from_domain");

    for domain in ["example.com", "east.corp.example.com", "a.b.c.d.e.f.example.org"] {
        group.bench_with_input(BenchmarkId::from_parameter(domain), domain, |b, domain| {
            b.iter(|| netutil::basedn_from_domain(black_box(domain)))
        });
    }

    group.finish();
}

fn bench_discovery_ladder(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let resolver = StaticResolver::new()
        .with_srv(
            "_ldap._tcp.example.com",
            &[("server1.example.com", 0, 100), ("server2.example.com", 1, 100)],
        )
        .with_srv("_kerberos._udp.example.com", &[("kdc1.example.com", 0, 100)]);
    let probe = ScriptedProbe::new()
        .with("server1.example.com", ProbeStatus::NoServerReachable, None)
        .with(
            "server2.example.com",
            ProbeStatus::Ok,
            Some(RootEntry {
                basedn: "dc=example,dc=com".into(),
                realm: Some("EXAMPLE.COM".into()),
                ..Default::default()
            }),
        );
    let settings = DiscoveryConfig::default();
    let request = SearchRequest::new("client1.lab.east.example.com");

    c.bench_function("discovery_ladder_guess_domain", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut engine = DiscoveryEngine::new(&resolver, &probe, &settings);
                black_box(engine.search(black_box(&request)).await)
            })
        })
    });
}

criterion_group!(
    benches,
    bench_srv_ordering,
    bench_hostname_checks,
    bench_basedn,
    bench_discovery_ladder
);
criterion_main!(benches);
