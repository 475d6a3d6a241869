mod server;

pub(crate) use server::DashboardServer;
