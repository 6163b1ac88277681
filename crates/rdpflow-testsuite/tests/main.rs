mod attach_user;
mod router;
