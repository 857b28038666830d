mod messages;
mod notifications;
mod reviews;
mod rooms;
mod transactions;
mod users;
