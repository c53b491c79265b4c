// handlers/protected/mod.rs - Installation-scoped handlers
//
// Security Level: account must hold viewer (GET) or editor (writes) on the
//                 installation named by ?installation=
// Route Prefix: /api/v1/resources
// Middleware: installation_access_middleware injects InstallationAccess

pub mod resources;
