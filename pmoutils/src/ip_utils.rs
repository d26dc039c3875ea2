use std::net::{IpAddr, UdpSocket};

/// Devine l'adresse IP locale de la machine.
///
/// Crée un socket UDP et le "connecte" vers un serveur DNS public (8.8.8.8) :
/// aucun paquet n'est émis, mais le système choisit l'interface qui serait
/// utilisée pour sortir. En cas d'échec à n'importe quelle étape, retourne
/// `127.0.0.1`.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}

/// Retourne l'hôte à annoncer pour une adresse d'écoute.
///
/// Un renderer DLNA ne peut pas joindre `0.0.0.0` : une adresse non spécifiée
/// (ou vide) est remplacée par [`guess_local_ip`]. Toute autre valeur est
/// conservée telle quelle (IP ou nom d'hôte).
pub fn advertised_host(bind_address: &str) -> String {
    let trimmed = bind_address.trim();
    if trimmed.is_empty() {
        return guess_local_ip();
    }
    match trimmed.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => guess_local_ip(),
        _ => trimmed.to_string(),
    }
}

/// Construit `http://host:port` (les IPv6 sont mises entre crochets).
pub fn http_base_url(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("http://[{}]:{}", v6, port),
        _ => format!("http://{}:{}", host, port),
    }
}
