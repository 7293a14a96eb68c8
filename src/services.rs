//! Well-known TCP service names, shown next to open ports.

use crate::types::Port;

/// Probable service listening on `port`, if it is a well-known one.
pub fn service_name(port: Port) -> Option<&'static str> {
    let name = match port.as_u16() {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        389 => "ldap",
        443 => "https",
        445 => "microsoft-ds",
        465 => "smtps",
        587 => "submission",
        636 => "ldaps",
        873 => "rsync",
        993 => "imaps",
        995 => "pop3s",
        1080 => "socks",
        1433 => "mssql",
        1521 => "oracle",
        1883 => "mqtt",
        2049 => "nfs",
        2375 => "docker",
        3306 => "mysql",
        3389 => "rdp",
        5432 => "postgresql",
        5672 => "amqp",
        5900 => "vnc",
        6379 => "redis",
        6443 => "kubernetes-api",
        8000 | 8008 | 8888 => "http-alt",
        8080 => "http-proxy",
        8443 => "https-alt",
        9000 => "cslistener",
        9090 => "prometheus",
        9092 => "kafka",
        9200 => "elasticsearch",
        11211 => "memcached",
        27017 => "mongodb",
        _ => return None,
    };
    Some(name)
}

/// Service name for display; "unknown" when not recognized.
pub fn service_label(port: Port) -> &'static str {
    service_name(port).unwrap_or("unknown")
}
