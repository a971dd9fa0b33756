/*!
 * @file srv.rs
 * @brief DNS SRV resolution for mongodb+srv:// URIs
 */

use std::net::{IpAddr, Ipv4Addr};

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::config::Replica;
use crate::error::{Error, Result};

const DEFAULT_DNS_SERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));

fn resolver_address(configured: Option<IpAddr>) -> IpAddr {
    configured
        .or_else(|| std::env::var("DNS_SERVER").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(DEFAULT_DNS_SERVER)
}

/// Look up `_mongodb._tcp.<host>`; every replica in an SRV cluster speaks
/// TLS.
pub(crate) async fn resolve_srv(host: &str, dns_server: Option<IpAddr>) -> Result<Vec<Replica>> {
    let server = resolver_address(dns_server);
    let name_servers = NameServerConfigGroup::from_ips_clear(&[server], 53, true);
    let config = ResolverConfig::from_parts(None, Vec::new(), name_servers);
    let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());

    let name = format!("_mongodb._tcp.{host}");
    let lookup = resolver
        .srv_lookup(name.clone())
        .await
        .map_err(|e| Error::Communication(format!("SRV lookup for {name} failed: {e}")))?;

    let replicas: Vec<Replica> = lookup
        .iter()
        .map(|record| Replica {
            host: record.target().to_utf8().trim_end_matches('.').to_string(),
            port: record.port(),
            tls: true,
        })
        .collect();
    if replicas.is_empty() {
        return Err(Error::Config(format!("no SRV records behind {name}")));
    }
    debug!(host, replicas = replicas.len(), "resolved SRV replica set");
    Ok(replicas)
}
